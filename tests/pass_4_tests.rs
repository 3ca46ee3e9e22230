//! Validation tests for Pass 4: Tick Scheduling & Quantization

use loop2midi::audio::{AudioBuffer, JobState};
use loop2midi::config::Config;
use loop2midi::passes::pass_4;
use loop2midi::passes::pass_4::{quantize_ticks, schedule, seconds_to_ticks, NOTE_ON_VELOCITY};
use loop2midi::{LoopError, NoteKind, OnsetEvent, Voice};

fn onset(time_sec: f32, voice: Voice) -> OnsetEvent {
    OnsetEvent {
        time_sec,
        voice,
        features: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_second_at_120_bpm() {
        assert_eq!(seconds_to_ticks(1.0, 120.0, 480), 960);

        let track = schedule(&[onset(1.0, Voice::Kick)], 120.0, 480, 16).unwrap();
        assert_eq!(track.events.len(), 2);

        let on = &track.events[0];
        assert_eq!(on.kind, NoteKind::On);
        assert_eq!(on.tick, 960);
        assert_eq!(on.delta, 960);
        assert_eq!(on.velocity, NOTE_ON_VELOCITY);
        assert_eq!(on.voice.midi_note(), 36);

        // 0.1 s at 120 BPM is a fifth of a beat
        let off = &track.events[1];
        assert_eq!(off.kind, NoteKind::Off);
        assert_eq!(off.tick, 960 + 96);
        assert_eq!(off.delta, 96);
    }

    #[test]
    fn test_sixteenth_grid() {
        // 480 * 4 / 16 = 120 ticks between grid lines
        assert_eq!(quantize_ticks(59, 480, 16), 0);
        assert_eq!(quantize_ticks(61, 480, 16), 120);
        assert_eq!(quantize_ticks(965, 480, 16), 960);
        assert_eq!(quantize_ticks(1021, 480, 16), 1080);
    }

    #[test]
    fn test_quantization_is_idempotent() {
        for &division in &[1u32, 4, 8, 12, 16, 32, 7] {
            for ticks in (0..5000u64).step_by(37) {
                let once = quantize_ticks(ticks, 480, division);
                assert_eq!(
                    quantize_ticks(once, 480, division),
                    once,
                    "division {} tick {}",
                    division,
                    ticks
                );
            }
        }
    }

    #[test]
    fn test_zero_division_keeps_raw_ticks() {
        assert_eq!(quantize_ticks(973, 480, 0), 973);

        let track = schedule(&[onset(1.013, Voice::Snare)], 120.0, 480, 0).unwrap();
        assert_eq!(track.events[0].tick, seconds_to_ticks(1.013, 120.0, 480));
        assert_ne!(track.events[0].tick % 120, 0);
    }

    #[test]
    fn test_events_sorted_with_consistent_deltas() {
        let onsets = vec![
            onset(1.5, Voice::ClosedHiHat),
            onset(0.0, Voice::Kick),
            onset(0.52, Voice::Snare),
            onset(0.51, Voice::ClosedHiHat),
            onset(3.0, Voice::Kick),
        ];
        let track = schedule(&onsets, 97.0, 480, 16).unwrap();

        assert_eq!(track.note_on_count(), onsets.len());
        let mut running = 0u64;
        for pair in track.events.windows(2) {
            assert!(pair[0].tick <= pair[1].tick);
        }
        for event in &track.events {
            running += event.delta;
            assert_eq!(running, event.tick);
        }
    }

    #[test]
    fn test_equal_ticks_keep_generation_order() {
        // unquantized: note-off of the first onset lands exactly on the second note-on
        let onsets = vec![onset(0.0, Voice::Kick), onset(0.1, Voice::Snare)];
        let track = schedule(&onsets, 120.0, 480, 0).unwrap();

        let layout: Vec<(u64, NoteKind, Voice)> =
            track.events.iter().map(|e| (e.tick, e.kind, e.voice)).collect();
        assert_eq!(
            layout,
            vec![
                (0, NoteKind::On, Voice::Kick),
                (96, NoteKind::Off, Voice::Kick),
                (96, NoteKind::On, Voice::Snare),
                (192, NoteKind::Off, Voice::Snare),
            ]
        );
        assert_eq!(track.events[2].delta, 0);
    }

    #[test]
    fn test_simultaneous_hits_both_kept() {
        let onsets = vec![onset(0.5, Voice::Kick), onset(0.5, Voice::ClosedHiHat)];
        let track = schedule(&onsets, 120.0, 480, 16).unwrap();
        assert_eq!(track.note_on_count(), 2);
        assert_eq!(track.events[0].voice, Voice::Kick);
        assert_eq!(track.events[1].voice, Voice::ClosedHiHat);
        assert_eq!(track.events[1].delta, 0);
    }

    #[test]
    fn test_empty_onsets() {
        let track = schedule(&[], 120.0, 480, 16).unwrap();
        assert!(track.events.is_empty());
        assert_eq!(track.ticks_per_beat, 480);
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        assert!(matches!(
            schedule(&[onset(0.0, Voice::Kick)], 0.0, 480, 16),
            Err(LoopError::InvalidTempo(_))
        ));
    }

    #[test]
    fn test_run_uses_state_tempo() {
        let mut state = JobState::from_stem(AudioBuffer::new(vec![0.0; 10], 44100));
        state.tempo_bpm = Some(60.0);
        state.onsets = vec![onset(2.0, Voice::Snare)];

        pass_4::run(&mut state, &Config::default()).unwrap();

        let track = state.track.unwrap();
        assert_eq!(track.tempo_bpm, 60.0);
        assert_eq!(track.events[0].tick, 960);
    }

    #[test]
    fn test_run_requires_tempo() {
        let mut state = JobState::from_stem(AudioBuffer::new(vec![0.0; 10], 44100));
        assert!(matches!(
            pass_4::run(&mut state, &Config::default()),
            Err(LoopError::PipelineError(_))
        ));
    }
}
