//! Audio I/O, the immutable sample buffer, and per-job state

use crate::analysis::{LoopWindow, OnsetEvent, Track};
use crate::error::{LoopError, Result as LoopResult};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::{Path, PathBuf};

/// Mono sample buffer with its sample rate
///
/// Never mutated after construction; [`AudioBuffer::crop`] returns a new
/// buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Sample index for a time, truncated and clipped to the buffer length
    pub fn sample_index(&self, time_sec: f32) -> usize {
        let idx = (time_sec.max(0.0) as f64 * self.sample_rate as f64) as usize;
        idx.min(self.samples.len())
    }

    /// Copy out `[start_sec, end_sec)` as a new buffer
    pub fn crop(&self, start_sec: f32, end_sec: f32) -> AudioBuffer {
        let start = self.sample_index(start_sec);
        let end = self.sample_index(end_sec).max(start);
        AudioBuffer::new(self.samples[start..end].to_vec(), self.sample_rate)
    }

    /// Borrow `duration_sec` of audio starting at `start_sec`, clipped to the end
    ///
    /// Empty when `start_sec` is at or past the end of the buffer.
    pub fn segment(&self, start_sec: f32, duration_sec: f32) -> &[f32] {
        let start = self.sample_index(start_sec);
        let len = (duration_sec.max(0.0) as f64 * self.sample_rate as f64) as usize;
        let end = start.saturating_add(len).min(self.samples.len());
        &self.samples[start..end]
    }
}

/// Everything one job produces on its way from input file to note sequence
///
/// Created per job and dropped after export; nothing here is shared.
#[derive(Debug, Clone)]
pub struct JobState {
    /// File handed to the separator
    pub input_path: PathBuf,

    // Pass 0: stem separation
    pub stem_path: Option<PathBuf>,
    pub stem: Option<AudioBuffer>,

    // Pass 1: tempo
    pub tempo_bpm: Option<f32>,

    // Pass 2: loop window
    pub loop_window: Option<LoopWindow>,
    pub loop_audio: Option<AudioBuffer>,

    // Pass 3: onsets and voices, times relative to the loop start
    pub onsets: Vec<OnsetEvent>,

    // Pass 4: scheduled notes
    pub track: Option<Track>,
}

impl JobState {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Self {
        Self {
            input_path: input_path.as_ref().to_path_buf(),
            stem_path: None,
            stem: None,
            tempo_bpm: None,
            loop_window: None,
            loop_audio: None,
            onsets: Vec::new(),
            track: None,
        }
    }

    /// Create a state whose stem is already in memory (skips pass 0)
    pub fn from_stem(stem: AudioBuffer) -> Self {
        let mut state = Self::new("");
        state.stem = Some(stem);
        state
    }

    /// Base name of the input file, used to name every output
    pub fn track_name(&self) -> String {
        self.input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("track")
            .to_string()
    }

    pub fn stem(&self) -> LoopResult<&AudioBuffer> {
        self.stem
            .as_ref()
            .ok_or_else(|| LoopError::PipelineError("stem audio has not been loaded".to_string()))
    }

    pub fn tempo(&self) -> LoopResult<f32> {
        self.tempo_bpm
            .ok_or_else(|| LoopError::PipelineError("tempo has not been estimated".to_string()))
    }

    pub fn loop_audio(&self) -> LoopResult<&AudioBuffer> {
        self.loop_audio
            .as_ref()
            .ok_or_else(|| LoopError::PipelineError("loop window has not been selected".to_string()))
    }
}

/// Load a WAV file as a mono buffer
///
/// Stereo input is averaged down to mono.
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> LoopResult<AudioBuffer> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.channels > 2 {
        return Err(LoopError::InvalidAudioFormat(format!(
            "{} channels not supported",
            spec.channels
        )));
    }

    if spec.sample_rate == 0 {
        return Err(LoopError::InvalidAudioFormat(
            "sample rate of 0 Hz".to_string(),
        ));
    }

    let mut samples: Vec<f32> = Vec::with_capacity(reader.len() as usize);

    match spec.sample_format {
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(LoopError::InvalidAudioFormat(format!(
                    "Unsupported bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                samples.push(sample? as f32 / max_value);
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                samples.push(sample?);
            }
        }
    }

    let samples = if spec.channels == 2 {
        samples
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) * 0.5)
            .collect()
    } else {
        samples
    };

    tracing::debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        n_samples = samples.len(),
        "Loaded audio"
    );

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

/// Write a buffer as 32-bit float mono WAV
pub fn write_wav<P: AsRef<Path>>(buffer: &AudioBuffer, path: P) -> LoopResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in buffer.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
