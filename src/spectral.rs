//! Spectral processing utilities (STFT, onset envelope, filtering)

use ndarray::{Array2, Axis};
use rustfft::{num_complex::Complex32, FftPlanner};

/// STFT data structure
#[derive(Debug, Clone)]
pub struct StftData {
    pub s: Array2<Complex32>,
    pub freqs: Vec<f32>,
    pub times: Vec<f32>,
}

/// Onset-strength envelope: one strength per analysis frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnsetEnvelope {
    /// Frame center times in seconds, strictly increasing
    pub times: Vec<f32>,
    pub strengths: Vec<f32>,
}

impl OnsetEnvelope {
    pub fn len(&self) -> usize {
        self.strengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty()
    }
}

/// Convert a frame index to seconds
pub fn frames_to_time(frame: usize, sample_rate: u32, hop_length: usize) -> f32 {
    (frame as f64 * hop_length as f64 / sample_rate as f64) as f32
}

/// Compute a centered STFT of an audio signal
///
/// The signal is zero-padded by `n_fft / 2` on both sides so frame `t` is
/// centered on sample `t * hop_length`, giving `1 + len / hop_length` frames.
pub fn stft(y: &[f32], n_fft: usize, hop_length: usize, window: &str, sample_rate: u32) -> StftData {
    let n_bins = n_fft / 2 + 1;
    let freqs: Vec<f32> = (0..n_bins)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    if y.is_empty() || hop_length == 0 {
        return StftData {
            s: Array2::<Complex32>::zeros((n_bins, 0)),
            freqs,
            times: Vec::new(),
        };
    }

    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; y.len() + 2 * pad];
    padded[pad..pad + y.len()].copy_from_slice(y);

    let n_frames = 1 + y.len() / hop_length;
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window_fn = generate_window(window, n_fft);
    let mut s = Array2::<Complex32>::zeros((n_bins, n_frames));
    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];

    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length;
        for (i, slot) in frame.iter_mut().enumerate() {
            let sample = padded.get(start + i).copied().unwrap_or(0.0);
            *slot = Complex32::new(sample * window_fn[i], 0.0);
        }

        fft.process(&mut frame);

        for (i, &val) in frame[..n_bins].iter().enumerate() {
            s[[i, frame_idx]] = val;
        }
    }

    let times: Vec<f32> = (0..n_frames)
        .map(|i| frames_to_time(i, sample_rate, hop_length))
        .collect();

    StftData { s, freqs, times }
}

/// Generate window function
fn generate_window(window_type: &str, size: usize) -> Vec<f32> {
    match window_type {
        // periodic Hann
        "hann" => (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
            .collect(),
        _ => vec![1.0; size],
    }
}

/// Compute magnitude spectrogram
pub fn magnitude_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm())
}

/// Per-frame spectral centroid in Hz; silent frames give 0
pub fn spectral_centroid(mag: &Array2<f32>, freqs: &[f32]) -> Vec<f32> {
    mag.axis_iter(Axis(1))
        .map(|column| {
            let total: f32 = column.sum();
            if total <= f32::EPSILON {
                return 0.0;
            }
            column
                .iter()
                .zip(freqs)
                .map(|(&m, &f)| m * f)
                .sum::<f32>()
                / total
        })
        .collect()
}

/// Sum of magnitudes over all frames for bins `bins`
pub fn band_energy(mag: &Array2<f32>, bins: std::ops::Range<usize>) -> f32 {
    let end = bins.end.min(mag.shape()[0]);
    if bins.start >= end {
        return 0.0;
    }
    mag.slice(ndarray::s![bins.start..end, ..]).sum()
}

/// Onset-strength envelope from half-wave rectified log-magnitude flux
///
/// Magnitudes are converted to dB relative to the loudest bin and floored
/// 80 dB below it, so the envelope does not depend on input gain.
///
/// The rise between frames `t - 1` and `t` is reported at frame
/// `t + n_fft / (2 * hop_length)`, so a frame's strength lines up with the
/// transient that produced it rather than with the earliest frame whose
/// window touches it. Leading frames are zero.
pub fn onset_strength(y: &[f32], sample_rate: u32, n_fft: usize, hop_length: usize) -> OnsetEnvelope {
    let stft_data = stft(y, n_fft, hop_length, "hann", sample_rate);
    let mag = magnitude_spectrogram(&stft_data);
    let (n_bins, n_frames) = (mag.shape()[0], mag.shape()[1]);

    let ref_power = mag.iter().fold(0.0f32, |acc, &m| acc.max(m * m));
    let floor_db = -80.0f32;
    let db = mag.map(|&m| {
        if ref_power <= 0.0 {
            floor_db
        } else {
            (10.0 * ((m * m).max(1e-10) / ref_power).log10()).max(floor_db)
        }
    });

    let lead = n_fft / (2 * hop_length.max(1));
    let mut strengths = vec![0.0f32; n_frames];
    for t in 1..n_frames {
        let slot = t + lead;
        if slot >= n_frames {
            break;
        }
        let mut rise = 0.0;
        for f in 0..n_bins {
            let diff = db[[f, t]] - db[[f, t - 1]];
            if diff > 0.0 {
                rise += diff;
            }
        }
        strengths[slot] = rise / n_bins as f32;
    }

    OnsetEnvelope {
        times: stft_data.times,
        strengths,
    }
}

/// One second-order IIR section (direct form I)
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Second-order low-pass from the bilinear transform
    fn lowpass(cutoff_hz: f64, sample_rate: f64, q: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// First-order low-pass, stored with zero second-order terms
    fn lowpass_first_order(cutoff_hz: f64, sample_rate: f64) -> Self {
        let k = (std::f64::consts::PI * cutoff_hz / sample_rate).tan();
        let norm = 1.0 / (1.0 + k);

        Self {
            b0: k * norm,
            b1: k * norm,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        }
    }

    fn process(&self, samples: &mut [f64]) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        for sample in samples.iter_mut() {
            let x0 = *sample;
            let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            *sample = y0;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
        }
    }
}

/// Butterworth low-pass sections for the given order
fn butterworth_sections(cutoff_hz: f64, sample_rate: f64, order: usize) -> Vec<Biquad> {
    let mut sections: Vec<Biquad> = (1..=order / 2)
        .map(|k| {
            let theta = (2 * k - 1) as f64 * std::f64::consts::PI / (2 * order) as f64;
            Biquad::lowpass(cutoff_hz, sample_rate, 1.0 / (2.0 * theta.sin()))
        })
        .collect();
    if order % 2 == 1 {
        sections.push(Biquad::lowpass_first_order(cutoff_hz, sample_rate));
    }
    sections
}

/// Zero-phase Butterworth low-pass (forward then backward pass)
///
/// Returns the input unchanged when the cutoff is not below Nyquist.
pub fn lowpass_filter(y: &[f32], sample_rate: u32, cutoff_hz: f32, order: usize) -> Vec<f32> {
    let nyquist = sample_rate as f32 / 2.0;
    if cutoff_hz <= 0.0 || cutoff_hz >= nyquist || order == 0 {
        tracing::debug!(cutoff_hz, nyquist, "Low-pass cutoff out of range, leaving signal unfiltered");
        return y.to_vec();
    }

    let sections = butterworth_sections(cutoff_hz as f64, sample_rate as f64, order);
    let mut work: Vec<f64> = y.iter().map(|&x| x as f64).collect();

    for section in &sections {
        section.process(&mut work);
    }
    work.reverse();
    for section in &sections {
        section.process(&mut work);
    }
    work.reverse();

    work.into_iter().map(|x| x as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_stft_frame_count_and_axes() {
        let y = vec![0.0; 10_000];
        let data = stft(&y, 2048, 512, "hann", 22050);
        assert_eq!(data.s.shape(), &[1025, 1 + 10_000 / 512]);
        assert_eq!(data.times.len(), data.s.shape()[1]);
        assert!((data.freqs[1] - 22050.0 / 2048.0).abs() < 1e-3);
        assert!((data.times[2] - 1024.0 / 22050.0).abs() < 1e-6);
    }

    #[test]
    fn test_stft_short_signal() {
        let data = stft(&[0.5; 100], 2048, 512, "hann", 44100);
        assert_eq!(data.s.shape()[1], 1);
        assert_eq!(stft(&[], 2048, 512, "hann", 44100).s.shape()[1], 0);
    }

    #[test]
    fn test_centroid_tracks_pitch() {
        let sr = 44100;
        let low = stft(&sine(200.0, sr, 8192), 2048, 512, "hann", sr);
        let high = stft(&sine(5000.0, sr, 8192), 2048, 512, "hann", sr);
        let c_low = spectral_centroid(&magnitude_spectrogram(&low), &low.freqs);
        let c_high = spectral_centroid(&magnitude_spectrogram(&high), &high.freqs);
        assert!(c_low[4] < 400.0, "low centroid {}", c_low[4]);
        assert!((c_high[4] - 5000.0).abs() < 200.0, "high centroid {}", c_high[4]);
    }

    #[test]
    fn test_centroid_of_silence_is_zero() {
        let data = stft(&[0.0; 4096], 2048, 512, "hann", 44100);
        let centroid = spectral_centroid(&magnitude_spectrogram(&data), &data.freqs);
        assert!(centroid.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_lowpass_attenuates_highs_keeps_lows() {
        let sr = 44100;
        let n = sr as usize;
        let low = lowpass_filter(&sine(60.0, sr, n), sr, 200.0, 4);
        let high = lowpass_filter(&sine(3000.0, sr, n), sr, 200.0, 4);
        // ignore filter edges
        let mid = n / 4..3 * n / 4;
        assert!(rms(&low[mid.clone()]) > 0.6);
        assert!(rms(&high[mid]) < 1e-3);
    }

    #[test]
    fn test_lowpass_passthrough_above_nyquist() {
        let y = sine(100.0, 8000, 800);
        assert_eq!(lowpass_filter(&y, 8000, 5000.0, 4), y);
    }

    #[test]
    fn test_onset_strength_peaks_at_burst() {
        let sr = 22050;
        let mut y = vec![0.0f32; sr as usize];
        for (i, s) in y[11025..11025 + 2000].iter_mut().enumerate() {
            *s = (2.0 * PI * 1000.0 * i as f32 / sr as f32).sin() * (-(i as f32) / 400.0).exp();
        }
        let env = onset_strength(&y, sr, 2048, 512);
        assert_eq!(env.len(), 1 + y.len() / 512);
        assert_eq!(env.strengths[0], 0.0);

        let (peak_idx, _) = env
            .strengths
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        let peak_time = env.times[peak_idx];
        assert!((peak_time - 0.5).abs() < 0.06, "peak at {}", peak_time);
    }

    #[test]
    fn test_onset_strength_does_not_lead_the_burst() {
        let sr = 22050;
        let start = 11025;
        let mut y = vec![0.0f32; sr as usize];
        for (i, s) in y[start..start + 2000].iter_mut().enumerate() {
            *s = (2.0 * PI * 1000.0 * i as f32 / sr as f32).sin() * (-(i as f32) / 400.0).exp();
        }
        let env = onset_strength(&y, sr, 2048, 512);

        // frames centered at or before the burst carry no rise
        for (t, &v) in env.times.iter().zip(&env.strengths) {
            if *t * (sr as f32) <= start as f32 {
                assert_eq!(v, 0.0, "strength {} at {}s", v, t);
            }
        }
        let first = env.strengths.iter().position(|&v| v > 0.0).unwrap();
        assert!(env.times[first] - 0.5 < 512.0 / sr as f32 + 1e-6);
    }
}
