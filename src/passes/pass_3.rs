//! Pass 3: Onset Detection & Voice Classification

use crate::analysis::{OnsetEvent, Voice, VoiceFeatures};
use crate::audio::{AudioBuffer, JobState};
use crate::config::{ClassifierConfig, Config, OnsetConfig};
use crate::error::Result as LoopResult;
use crate::spectral::{
    band_energy, frames_to_time, magnitude_spectrogram, onset_strength, spectral_centroid, stft,
};

/// Voice used when there is no audio after an onset
pub const DEFAULT_VOICE: Voice = Voice::Snare;

fn secs_to_frames(sec: f32, sample_rate: u32, hop_length: usize) -> usize {
    (sec as f64 * sample_rate as f64 / hop_length as f64).round() as usize
}

/// Pick peaks from a [0, 1]-normalized onset envelope
///
/// A frame is an onset when it is the maximum of
/// `[i - pre_max, i + post_max]`, exceeds the mean of
/// `[i - pre_avg, i + post_avg]` by `delta`, and comes at least `wait`
/// frames after the previous onset.
pub fn peak_pick(
    x: &[f32],
    pre_max: usize,
    post_max: usize,
    pre_avg: usize,
    post_avg: usize,
    delta: f32,
    wait: usize,
) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;

    for i in 0..n {
        if let Some(prev) = last {
            if i <= prev + wait {
                continue;
            }
        }

        let max_lo = i.saturating_sub(pre_max);
        let max_hi = (i + post_max + 1).min(n);
        let local_max = x[max_lo..max_hi].iter().copied().fold(f32::MIN, f32::max);
        if x[i] < local_max {
            continue;
        }

        let avg_lo = i.saturating_sub(pre_avg);
        let avg_hi = (i + post_avg + 1).min(n);
        let local_mean = x[avg_lo..avg_hi].iter().sum::<f32>() / (avg_hi - avg_lo) as f32;
        if x[i] < local_mean + delta {
            continue;
        }

        peaks.push(i);
        last = Some(i);
    }

    peaks
}

/// Move each onset back to the closest envelope minimum at or before it
pub fn backtrack(onsets: &[usize], energy: &[f32]) -> Vec<usize> {
    let mut minima = vec![0usize];
    for i in 1..energy.len().saturating_sub(1) {
        if energy[i] <= energy[i - 1] && energy[i] < energy[i + 1] {
            minima.push(i);
        }
    }

    onsets
        .iter()
        .map(|&onset| {
            let idx = minima.partition_point(|&m| m <= onset);
            minima[idx.saturating_sub(1)]
        })
        .collect()
}

/// Detect onset times (seconds from the buffer start)
pub fn detect_onsets(buffer: &AudioBuffer, config: &OnsetConfig) -> Vec<f32> {
    if buffer.is_empty() {
        return Vec::new();
    }

    let sr = buffer.sample_rate();
    let hop = config.hop_length;
    let envelope = onset_strength(buffer.samples(), sr, config.n_fft, hop);

    let min = envelope.strengths.iter().copied().fold(f32::INFINITY, f32::min);
    let max = envelope.strengths.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return Vec::new();
    }
    let normalized: Vec<f32> = envelope.strengths.iter().map(|&v| (v - min) / range).collect();

    let frames = |sec: f32| secs_to_frames(sec, sr, hop);
    let mut peaks = peak_pick(
        &normalized,
        frames(config.pre_max_sec),
        frames(config.post_max_sec),
        frames(config.pre_avg_sec),
        frames(config.post_avg_sec),
        config.delta,
        frames(config.wait_sec),
    );

    if config.backtrack {
        peaks = backtrack(&peaks, &envelope.strengths);
        peaks.dedup();
    }

    peaks
        .into_iter()
        .map(|frame| frames_to_time(frame, sr, hop))
        .collect()
}

/// Low/high band energy and mean centroid of a segment
///
/// Returns `None` for an empty segment.
pub fn extract_voice_features(
    segment: &[f32],
    sample_rate: u32,
    config: &ClassifierConfig,
) -> Option<VoiceFeatures> {
    if segment.is_empty() {
        return None;
    }

    let n_fft = config.n_fft;
    let stft_data = stft(segment, n_fft, n_fft / 4, "hann", sample_rate);
    let mag = magnitude_spectrogram(&stft_data);
    let n_bins = mag.shape()[0];

    let bins_per_hz = n_fft as f64 / sample_rate as f64;
    // bins with frequency strictly below the low edge / strictly above the high edge
    let low_end = ((config.low_band_hz as f64 * bins_per_hz).ceil() as usize).min(n_bins);
    let high_start = ((config.high_band_hz as f64 * bins_per_hz).floor() as usize + 1).min(n_bins);

    let centroids = spectral_centroid(&mag, &stft_data.freqs);
    let avg_centroid_hz = if centroids.is_empty() {
        0.0
    } else {
        centroids.iter().sum::<f32>() / centroids.len() as f32
    };

    Some(VoiceFeatures {
        low_energy: band_energy(&mag, 0..low_end),
        high_energy: band_energy(&mag, high_start..n_bins),
        avg_centroid_hz,
    })
}

/// Kick first, then snare vs. closed hi-hat by centroid
pub fn classify_features(features: &VoiceFeatures, config: &ClassifierConfig) -> Voice {
    if features.low_energy > features.high_energy * config.kick_ratio {
        Voice::Kick
    } else if features.avg_centroid_hz < config.snare_max_centroid_hz {
        Voice::Snare
    } else {
        Voice::ClosedHiHat
    }
}

/// Classify the audio following one onset
pub fn classify_onset(segment: &[f32], sample_rate: u32, config: &ClassifierConfig) -> Voice {
    extract_voice_features(segment, sample_rate, config)
        .map(|features| classify_features(&features, config))
        .unwrap_or(DEFAULT_VOICE)
}

/// Detect and classify every onset in a buffer
pub fn transcribe_onsets(
    buffer: &AudioBuffer,
    onset_config: &OnsetConfig,
    classifier_config: &ClassifierConfig,
) -> Vec<OnsetEvent> {
    let segment_sec = classifier_config.segment_ms / 1000.0;

    detect_onsets(buffer, onset_config)
        .into_iter()
        .map(|time_sec| {
            let segment = buffer.segment(time_sec, segment_sec);
            let features = extract_voice_features(segment, buffer.sample_rate(), classifier_config);
            let voice = features
                .as_ref()
                .map(|f| classify_features(f, classifier_config))
                .unwrap_or(DEFAULT_VOICE);
            OnsetEvent {
                time_sec,
                voice,
                features,
            }
        })
        .collect()
}

/// Detect and classify onsets in the cropped loop
pub fn run(state: &mut JobState, config: &Config) -> LoopResult<()> {
    let loop_audio = state.loop_audio()?;
    let onsets = transcribe_onsets(loop_audio, &config.onset, &config.classifier);

    let kicks = onsets.iter().filter(|o| o.voice == Voice::Kick).count();
    let snares = onsets.iter().filter(|o| o.voice == Voice::Snare).count();
    let hats = onsets.len() - kicks - snares;
    tracing::info!(onsets = onsets.len(), kicks, snares, hats, "Pass 3: Onsets classified");

    state.onsets = onsets;
    Ok(())
}
