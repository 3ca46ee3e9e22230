//! Pass 2: Loop Window Selection
//!
//! Finds the fixed-length span (bars x beats per bar at the stem tempo) whose
//! low-frequency onset energy is highest. Full-band onset envelopes on a drum
//! stem are dominated by hats and cymbals; low-passing first makes the search
//! lock onto the kick/bass groove instead.

use crate::analysis::LoopWindow;
use crate::audio::{AudioBuffer, JobState};
use crate::config::{Config, LoopWindowConfig};
use crate::error::{LoopError, Result as LoopResult};
use crate::spectral::{lowpass_filter, onset_strength};

/// Target loop length in seconds
pub fn loop_duration_sec(tempo_bpm: f32, bars: u32, beats_per_bar: u32) -> f32 {
    bars as f32 * beats_per_bar as f32 * 60.0 / tempo_bpm
}

/// Start index of the `window`-long run with the largest sum
///
/// Ties go to the earliest start. `window` must be in `1..=values.len()`.
pub fn max_energy_start(values: &[f32], window: usize) -> usize {
    let mut sum: f64 = values[..window].iter().map(|&v| v as f64).sum();
    let mut best_sum = sum;
    let mut best_start = 0;

    for start in 1..=values.len() - window {
        sum += values[start + window - 1] as f64 - values[start - 1] as f64;
        if sum > best_sum {
            best_sum = sum;
            best_start = start;
        }
    }

    best_start
}

/// Select the most rhythmically energetic loop window
///
/// If the stem is no longer than one window the whole stem is returned,
/// `[0, duration]`.
pub fn select_loop_window(
    buffer: &AudioBuffer,
    tempo_bpm: f32,
    config: &LoopWindowConfig,
) -> LoopResult<LoopWindow> {
    if buffer.is_empty() {
        return Err(LoopError::EmptyInput);
    }
    if !tempo_bpm.is_finite() || tempo_bpm <= 0.0 {
        return Err(LoopError::InvalidTempo(tempo_bpm));
    }

    let sr = buffer.sample_rate();
    let hop = config.hop_length;
    let duration = buffer.duration_sec();
    let target_sec = loop_duration_sec(tempo_bpm, config.bars, config.beats_per_bar);

    let groove = lowpass_filter(buffer.samples(), sr, config.lowpass_hz, config.lowpass_order);
    let envelope = onset_strength(&groove, sr, config.n_fft, hop);
    let n = envelope.len();

    let window_frames = ((target_sec as f64 * sr as f64 / hop as f64).round() as usize).max(1);

    if window_frames >= n || duration <= target_sec {
        tracing::debug!(duration, target_sec, "Stem shorter than one loop, using all of it");
        return Ok(LoopWindow {
            start_sec: 0.0,
            end_sec: duration,
        });
    }

    let start_frame = max_energy_start(&envelope.strengths, window_frames);
    let end_frame = (start_frame + window_frames).min(n - 1);

    Ok(LoopWindow {
        start_sec: envelope.times[start_frame],
        end_sec: envelope.times[end_frame].min(duration),
    })
}

/// Select the loop window and crop the stem to it
pub fn run(state: &mut JobState, config: &Config) -> LoopResult<()> {
    let tempo_bpm = state.tempo()?;
    let stem = state.stem()?;

    let window = select_loop_window(stem, tempo_bpm, &config.loop_window)?;
    let loop_audio = stem.crop(window.start_sec, window.end_sec);

    tracing::info!(
        window.start = window.start_sec,
        window.end = window.end_sec,
        "Pass 2: Loop selected"
    );

    state.loop_window = Some(window);
    state.loop_audio = Some(loop_audio);
    Ok(())
}
