//! Active-voice selection
//!
//! Every tick that something changed, live voices are classified into
//! audible, inaudible-but-ticking ("must live"), and idle. Must-live
//! voices are partitioned to the head of the active list; when the
//! candidates exceed the cap, the loudest of the rest fill the remaining
//! slots.

use std::cmp::Ordering;

use super::engine::EngineState;
use crate::voice::flags;

impl EngineState {
    /// Rebuild the active voice list. Called from the mixer tick when
    /// `active_voice_dirty` is set, and from count queries.
    pub(crate) fn calc_active_voices(&mut self) {
        self.active_voice_dirty = false;

        let mut candidates = 0;
        let mut mustlive = 0;
        for i in 0..self.highest_voice {
            let Some(voice) = self.voices[i].as_ref() else {
                continue;
            };
            if voice.has_flag(flags::PAUSED) {
                continue;
            }
            if voice.has_flag(flags::INAUDIBLE) && !voice.has_flag(flags::INAUDIBLE_TICK) {
                continue;
            }
            self.active_voice[candidates] = i;
            candidates += 1;
            if voice.has_flag(flags::INAUDIBLE_TICK) {
                // Must-live voices go to the head of the list
                self.active_voice.swap(candidates - 1, mustlive);
                mustlive += 1;
            }
        }

        if candidates <= self.max_active_voices {
            self.active_voice_count = candidates;
            return;
        }

        self.active_voice_count = self.max_active_voices;

        if mustlive >= self.max_active_voices {
            // The must-live voices already ate every slot. Nothing to
            // sort, and no way to report it from the mixer thread.
            return;
        }

        // Select the loudest of the remaining candidates into the open
        // slots. The comparator is a strict total order (volume
        // descending, then voice id), so the selected set is
        // deterministic and ties go to the lower id.
        let k = self.max_active_voices - mustlive;
        let voices = &self.voices;
        let tail = &mut self.active_voice[mustlive..candidates];
        tail.select_nth_unstable_by(k - 1, |&a, &b| {
            let va = voices[a].as_ref().map_or(0.0, |v| v.overall_volume);
            let vb = voices[b].as_ref().map_or(0.0, |v| v.overall_volume);
            vb.partial_cmp(&va)
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::test_util::{test_engine, ConstSource};
    use crate::voice::flags;

    #[test]
    fn test_all_candidates_fit_under_cap() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 44100.0);
        for _ in 0..3 {
            engine.play(&source);
        }
        let mut state = engine.core().lock();
        state.calc_active_voices();
        assert_eq!(state.active_voice_count, 3);
    }

    #[test]
    fn test_cap_keeps_loudest_voices() {
        let engine = test_engine(44100);
        engine.set_max_active_voices(2).unwrap();
        let source = ConstSource::mono(0.5, 44100.0);

        let quiet = engine.play_with(&source, crate::PlayOptions::default().volume(0.1));
        let loud = engine.play_with(&source, crate::PlayOptions::default().volume(0.9));
        let mid = engine.play_with(&source, crate::PlayOptions::default().volume(0.5));

        let mut state = engine.core().lock();
        state.calc_active_voices();
        assert_eq!(state.active_voice_count, 2);

        let selected: Vec<usize> = state.active_voice[..2].to_vec();
        let loud_slot = state.voice_from_handle(loud).unwrap();
        let mid_slot = state.voice_from_handle(mid).unwrap();
        let quiet_slot = state.voice_from_handle(quiet).unwrap();
        assert!(selected.contains(&loud_slot));
        assert!(selected.contains(&mid_slot));
        assert!(!selected.contains(&quiet_slot));
    }

    #[test]
    fn test_equal_volumes_prefer_lower_id() {
        let engine = test_engine(44100);
        engine.set_max_active_voices(2).unwrap();
        let source = ConstSource::mono(0.5, 44100.0);
        for _ in 0..4 {
            engine.play(&source);
        }

        let mut state = engine.core().lock();
        state.calc_active_voices();
        let mut selected: Vec<usize> = state.active_voice[..2].to_vec();
        selected.sort_unstable();
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn test_mustlive_voices_lead_the_list() {
        let engine = test_engine(44100);
        engine.set_max_active_voices(2).unwrap();
        let source = ConstSource::mono(0.5, 44100.0);

        let loud_a = engine.play_with(&source, crate::PlayOptions::default().volume(0.9));
        let loud_b = engine.play_with(&source, crate::PlayOptions::default().volume(0.8));
        let silent = engine.play_with(&source, crate::PlayOptions::default().volume(0.0));
        engine.set_inaudible_behavior(silent, true, false);
        let _ = (loud_a, loud_b);

        let mut state = engine.core().lock();
        state.calc_active_voices();
        assert_eq!(state.active_voice_count, 2);

        // The must-live voice occupies the head slot ahead of louder ones
        let head = state.active_voice[0];
        let head_voice = state.voices[head].as_ref().unwrap();
        assert!(head_voice.has_flag(flags::INAUDIBLE_TICK));
    }

    #[test]
    fn test_paused_voices_never_selected() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 44100.0);
        let a = engine.play(&source);
        engine.play(&source);
        engine.set_pause(a, true);

        let mut state = engine.core().lock();
        state.calc_active_voices();
        assert_eq!(state.active_voice_count, 1);
        let slot = state.active_voice[0];
        assert!(!state.voices[slot].as_ref().unwrap().is_paused());
    }

    #[test]
    fn test_inaudible_without_tick_is_skipped() {
        let engine = test_engine(44100);
        let source = ConstSource::mono(0.5, 44100.0);
        let silent = engine.play_with(&source, crate::PlayOptions::default().volume(0.0));
        engine.play(&source);
        let _ = silent;

        let mut state = engine.core().lock();
        state.calc_active_voices();
        assert_eq!(state.active_voice_count, 1);
    }
}
