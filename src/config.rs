//! Configuration system for the loop-to-MIDI processor

use crate::error::{LoopError, Result as LoopResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub separation: SeparationConfig,
    pub loop_window: LoopWindowConfig,
    pub tempo: TempoConfig,
    pub onset: OnsetConfig,
    pub classifier: ClassifierConfig,
    pub schedule: ScheduleConfig,
    pub export: ExportConfig,
    pub plot: PlotConfig,
}

/// External stem separation tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Executable to invoke
    pub command: String,
    /// Separation model name; also the first directory under `output_root`
    pub model: String,
    /// Directory the tool writes `<model>/<track>/<stem>.wav` into
    pub output_root: PathBuf,
    /// Stem to isolate (drums, bass, vocals, ...)
    pub stem: String,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            command: "demucs".to_string(),
            model: "htdemucs".to_string(),
            output_root: PathBuf::from("separated"),
            stem: "drums".to_string(),
        }
    }
}

/// Loop window search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopWindowConfig {
    pub bars: u32,
    pub beats_per_bar: u32,
    /// Groove low-pass cutoff
    pub lowpass_hz: f32,
    pub lowpass_order: usize,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for LoopWindowConfig {
    fn default() -> Self {
        Self {
            bars: 4,
            beats_per_bar: 4,
            lowpass_hz: 200.0,
            lowpass_order: 4,
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

/// Tempo estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Centre of the log-tempo prior
    pub prior_bpm: f32,
    /// Width of the log-tempo prior, in octaves
    pub prior_octaves: f32,
    /// Used when the envelope shows no periodicity at all
    pub fallback_bpm: f32,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_bpm: 40.0,
            max_bpm: 240.0,
            prior_bpm: 120.0,
            prior_octaves: 1.0,
            fallback_bpm: 120.0,
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

/// Onset peak picking on the cropped loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub pre_max_sec: f32,
    pub post_max_sec: f32,
    pub pre_avg_sec: f32,
    pub post_avg_sec: f32,
    /// Threshold above the local mean, on the [0, 1] normalized envelope
    pub delta: f32,
    /// Minimum gap between consecutive onsets
    pub wait_sec: f32,
    /// Move each onset back to the preceding envelope minimum
    pub backtrack: bool,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            pre_max_sec: 0.03,
            post_max_sec: 0.0,
            pre_avg_sec: 0.10,
            post_avg_sec: 0.10,
            delta: 0.07,
            wait_sec: 0.03,
            backtrack: true,
        }
    }
}

/// Voice classification heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Analysis window following each onset
    pub segment_ms: f32,
    pub n_fft: usize,
    /// Bins strictly below this frequency count as low band
    pub low_band_hz: f32,
    /// Bins strictly above this frequency count as high band
    pub high_band_hz: f32,
    /// Kick when low energy exceeds high energy times this ratio
    pub kick_ratio: f32,
    /// Snare below this average centroid, closed hi-hat above
    pub snare_max_centroid_hz: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            segment_ms: 50.0,
            n_fft: 2048,
            low_band_hz: 150.0,
            high_band_hz: 2000.0,
            kick_ratio: 0.8,
            snare_max_centroid_hz: 3500.0,
        }
    }
}

/// Tick conversion and quantization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub ticks_per_beat: u16,
    /// Notes per whole note on the quantization grid; 0 disables quantization
    pub quantization_division: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: 480,
            quantization_division: 16,
        }
    }
}

/// Side outputs of a transcription job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub write_loop_wav: bool,
    pub write_analysis: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            write_loop_wav: true,
            write_analysis: true,
        }
    }
}

/// Raw-stem spectrogram image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub min_freq_hz: f32,
    /// Number of log-spaced frequency rows drawn
    pub freq_rows: usize,
    /// Dynamic range below the loudest cell
    pub top_db: f32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 600,
            n_fft: 2048,
            hop_length: 512,
            min_freq_hz: 20.0,
            freq_rows: 200,
            top_db: 80.0,
        }
    }
}

const MAX_LOOP_BARS: u32 = 256;
const MAX_BEATS_PER_BAR: u32 = 32;

fn check(cond: bool, msg: &str) -> LoopResult<()> {
    if cond {
        Ok(())
    } else {
        Err(LoopError::ConfigValidationFailed(msg.to_string()))
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> LoopResult<()> {
    check(!config.separation.command.is_empty(), "separation.command must not be empty")?;
    check(!config.separation.stem.is_empty(), "separation.stem must not be empty")?;

    let lw = &config.loop_window;
    check(lw.bars >= 1 && lw.beats_per_bar >= 1, "loop_window bars and beats_per_bar must be >= 1")?;
    check(
        lw.bars <= MAX_LOOP_BARS && lw.beats_per_bar <= MAX_BEATS_PER_BAR,
        "loop_window bars must be <= 256 and beats_per_bar <= 32",
    )?;
    check(lw.lowpass_hz > 0.0, "loop_window.lowpass_hz must be > 0")?;
    check(lw.lowpass_order >= 1, "loop_window.lowpass_order must be >= 1")?;
    check(lw.hop_length > 0 && lw.n_fft >= lw.hop_length, "loop_window n_fft must be >= hop_length > 0")?;

    let t = &config.tempo;
    check(t.min_bpm > 0.0 && t.min_bpm < t.max_bpm, "tempo range min must be > 0 and < max")?;
    check(t.fallback_bpm > 0.0 && t.prior_bpm > 0.0, "tempo fallback and prior must be > 0")?;
    check(t.prior_octaves > 0.0, "tempo.prior_octaves must be > 0")?;
    check(t.hop_length > 0 && t.n_fft >= t.hop_length, "tempo n_fft must be >= hop_length > 0")?;

    let o = &config.onset;
    check(o.hop_length > 0 && o.n_fft >= o.hop_length, "onset n_fft must be >= hop_length > 0")?;
    check(
        o.pre_max_sec >= 0.0 && o.post_max_sec >= 0.0 && o.pre_avg_sec >= 0.0 && o.post_avg_sec >= 0.0,
        "onset windows must be non-negative",
    )?;

    let c = &config.classifier;
    check(c.segment_ms > 0.0, "classifier.segment_ms must be > 0")?;
    check(c.n_fft >= 4, "classifier.n_fft must be >= 4")?;
    check(c.low_band_hz < c.high_band_hz, "classifier low band must sit below high band")?;

    check(config.schedule.ticks_per_beat > 0, "schedule.ticks_per_beat must be > 0")?;
    // midly stores the division as a 15-bit value
    check(config.schedule.ticks_per_beat <= 0x7FFF, "schedule.ticks_per_beat must fit in 15 bits")?;

    let p = &config.plot;
    check(p.width > 0 && p.height > 0, "plot dimensions must be > 0")?;
    check(p.hop_length > 0 && p.n_fft >= p.hop_length, "plot n_fft must be >= hop_length > 0")?;
    check(p.freq_rows > 0 && p.min_freq_hz > 0.0, "plot rows and min frequency must be > 0")?;
    check(p.top_db > 0.0, "plot.top_db must be > 0")?;

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> LoopResult<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| LoopError::ConfigValidationFailed(format!("invalid JSON: {}", e)))?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> LoopResult<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
