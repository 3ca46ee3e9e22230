//! Pass 1: Tempo Estimation
//!
//! Runs on the full, unfiltered stem. The loop search in pass 2 looks at a
//! low-passed copy instead; tempo wants every transient, the loop search
//! wants the groove.

use crate::audio::JobState;
use crate::config::{Config, TempoConfig};
use crate::error::Result as LoopResult;
use crate::spectral::{onset_strength, OnsetEnvelope};

/// Estimate tempo in BPM from an onset envelope
///
/// Scores every lag in the configured BPM range by the normalized
/// autocorrelation of the mean-removed envelope, weighted by a log-tempo
/// Gaussian prior, then refines the winning lag with a parabolic fit.
/// Returns `config.fallback_bpm` when the envelope shows no periodicity.
pub fn estimate_tempo(envelope: &OnsetEnvelope, sample_rate: u32, config: &TempoConfig) -> f32 {
    let x = &envelope.strengths;
    let n = x.len();
    let frame_rate = sample_rate as f64 / config.hop_length as f64;
    let lag_to_bpm = |lag: f64| (60.0 * frame_rate / lag) as f32;

    let min_lag = ((60.0 * frame_rate / config.max_bpm as f64).ceil() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / config.min_bpm as f64).floor() as usize).min(n.saturating_sub(2));
    if n < 3 || min_lag > max_lag {
        tracing::debug!(frames = n, "Envelope too short for tempo estimation");
        return config.fallback_bpm;
    }

    let mean = x.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let centered: Vec<f64> = x.iter().map(|&v| v as f64 - mean).collect();
    let autocorr = |lag: usize| -> f64 {
        centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum()
    };

    let energy = autocorr(0);
    if energy <= f64::EPSILON {
        return config.fallback_bpm;
    }

    let prior = |bpm: f32| -> f64 {
        let octaves = (bpm / config.prior_bpm).log2() / config.prior_octaves;
        (-0.5 * (octaves * octaves) as f64).exp()
    };

    // one extra lag on each side for the parabolic fit
    let lo = min_lag.saturating_sub(1).max(1);
    let hi = (max_lag + 1).min(n - 1);
    let scores: Vec<f64> = (lo..=hi)
        .map(|lag| (autocorr(lag) / energy) * prior(lag_to_bpm(lag as f64)))
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let score = scores[lag - lo];
        if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((lag, score));
        }
    }

    let Some((best_lag, _)) = best else {
        tracing::debug!("No periodicity in onset envelope, using fallback tempo");
        return config.fallback_bpm;
    };

    let mut refined = best_lag as f64;
    if best_lag > lo && best_lag < hi {
        let (a, b, c) = (
            scores[best_lag - 1 - lo],
            scores[best_lag - lo],
            scores[best_lag + 1 - lo],
        );
        let denom = a - 2.0 * b + c;
        if denom < 0.0 {
            let offset = 0.5 * (a - c) / denom;
            if offset.abs() < 1.0 {
                refined += offset;
            }
        }
    }

    lag_to_bpm(refined).clamp(config.min_bpm, config.max_bpm)
}

/// Estimate the stem tempo and store it on the state
pub fn run(state: &mut JobState, config: &Config) -> LoopResult<()> {
    let stem = state.stem()?;
    let tc = &config.tempo;

    let envelope = onset_strength(stem.samples(), stem.sample_rate(), tc.n_fft, tc.hop_length);
    let tempo_bpm = estimate_tempo(&envelope, stem.sample_rate(), tc);

    tracing::info!(tempo_bpm, "Pass 1: Tempo estimated");
    state.tempo_bpm = Some(tempo_bpm);
    Ok(())
}
