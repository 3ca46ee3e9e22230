//! Validation tests for Pass 1: Tempo Estimation

mod common;

use common::{click_track, drum_loop, SR};
use loop2midi::audio::{AudioBuffer, JobState};
use loop2midi::config::{Config, TempoConfig};
use loop2midi::passes::pass_1;
use loop2midi::passes::pass_1::estimate_tempo;
use loop2midi::spectral::onset_strength;
use loop2midi::LoopError;

/// Run the tempo estimator on raw samples with default settings
fn tempo_of(samples: &[f32]) -> f32 {
    let config = TempoConfig::default();
    let envelope = onset_strength(samples, SR, config.n_fft, config.hop_length);
    estimate_tempo(&envelope, SR, &config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_track_tempos() {
        for &bpm in &[100.0f32, 120.0, 128.0] {
            let estimated = tempo_of(&click_track(12.0, bpm));
            println!("Click track {} BPM -> estimated {:.2} BPM", bpm, estimated);
            assert!(
                (estimated - bpm).abs() < 4.0,
                "expected ~{} BPM, got {:.2}",
                bpm,
                estimated
            );
        }
    }

    #[test]
    fn test_full_kit_pattern() {
        let estimated = tempo_of(&drum_loop(12.0, 120.0));
        println!("Drum loop 120 BPM -> estimated {:.2} BPM", estimated);
        assert!((estimated - 120.0).abs() < 5.0);
    }

    #[test]
    fn test_silence_uses_fallback() {
        let silence = vec![0.0f32; SR as usize * 5];
        assert_eq!(tempo_of(&silence), TempoConfig::default().fallback_bpm);
    }

    #[test]
    fn test_tempo_stays_in_configured_range() {
        let config = TempoConfig {
            min_bpm: 60.0,
            max_bpm: 90.0,
            ..TempoConfig::default()
        };
        let samples = click_track(12.0, 120.0);
        let envelope = onset_strength(&samples, SR, config.n_fft, config.hop_length);
        let estimated = estimate_tempo(&envelope, SR, &config);
        println!("120 BPM clicks limited to 60-90 -> {:.2} BPM", estimated);
        assert!((60.0..=90.0).contains(&estimated));
    }

    #[test]
    fn test_run_stores_tempo() {
        let mut state = JobState::from_stem(AudioBuffer::new(click_track(10.0, 120.0), SR));
        pass_1::run(&mut state, &Config::default()).unwrap();
        let tempo = state.tempo().unwrap();
        assert!(tempo > 0.0 && tempo.is_finite());
    }

    #[test]
    fn test_run_requires_stem() {
        let mut state = JobState::new("song.wav");
        assert!(matches!(
            pass_1::run(&mut state, &Config::default()),
            Err(LoopError::PipelineError(_))
        ));
    }
}
