//! Loop-to-MIDI Transcription System
//!
//! Separates a stem from a recorded track, picks the most rhythmically
//! energetic few bars of it, and transcribes that loop into a quantized
//! drum-note sequence. Alternatively exports the raw stem with a
//! log-frequency spectrogram.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod jobs;
pub mod midi;
pub mod passes;
pub mod plot;
pub mod progress;
pub mod separation;
pub mod spectral;

pub use analysis::{LoopWindow, NoteEvent, NoteKind, OnsetEvent, Track, Voice};
pub use audio::{AudioBuffer, JobState};
pub use config::Config;
pub use error::{LoopError, Result as LoopResult};
pub use progress::ProgressSink;
pub use separation::{DemucsSeparator, PreSeparated, Separator};

use progress::{milestones, ProgressTracker};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a job hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Loop selection and drum transcription to MIDI
    Transcribe,
    /// The separated stem as-is plus a spectrogram image
    RawStem,
}

/// Files and measurements produced by one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub mode: OutputMode,
    pub stem_path: PathBuf,
    pub midi_path: Option<PathBuf>,
    pub loop_wav_path: Option<PathBuf>,
    pub analysis_path: Option<PathBuf>,
    pub spectrogram_path: Option<PathBuf>,
    /// Detected tempo; 0 in raw-stem mode
    pub tempo_bpm: f32,
    pub loop_window: Option<LoopWindow>,
    pub note_count: usize,
}

/// Main processing pipeline for loop selection and transcription
pub struct LoopToMidi {
    config: Config,
    separator: Box<dyn Separator>,
}

impl LoopToMidi {
    /// Create a processor with an explicit separator
    pub fn new(config: Config, separator: Box<dyn Separator>) -> Self {
        Self { config, separator }
    }

    /// Create a processor that shells out to the configured separation tool
    pub fn with_demucs(config: Config) -> Self {
        let separator = Box::new(DemucsSeparator::new(&config.separation));
        Self::new(config, separator)
    }

    /// Process one input file
    ///
    /// The configuration is checked before anything runs. Any pass failure
    /// aborts the job; no partial output is returned.
    pub fn process(
        &self,
        input_path: &Path,
        output_dir: &Path,
        mode: OutputMode,
        progress: &mut dyn ProgressSink,
    ) -> LoopResult<JobOutput> {
        config::validate_config(&self.config)?;

        let mut tracker = ProgressTracker::new(progress);
        let mut state = JobState::new(input_path);

        tracker.report(milestones::SEPARATION_STARTED, "Separating stem");
        passes::pass_0::run(&mut state, &self.config, self.separator.as_ref())?;
        tracker.report(milestones::STEM_SEPARATED, "Stem separated");

        std::fs::create_dir_all(output_dir)?;

        let output = match mode {
            OutputMode::Transcribe => self.run_transcription(&mut state, output_dir, &mut tracker)?,
            OutputMode::RawStem => self.run_raw_stem(&state, output_dir, &mut tracker)?,
        };

        tracker.report(milestones::COMPLETE, "Complete");
        Ok(output)
    }

    /// Run passes 1-4 on a state whose stem is already loaded
    pub fn run_pipeline(&self, state: &mut JobState, tracker: &mut ProgressTracker<'_>) -> LoopResult<()> {
        passes::pass_1::run(state, &self.config)?;
        tracker.report(milestones::TEMPO_FOUND, "Tempo found");

        passes::pass_2::run(state, &self.config)?;
        tracker.report(milestones::LOOP_SELECTED, "Loop selected");

        passes::pass_3::run(state, &self.config)?;
        passes::pass_4::run(state, &self.config)?;
        tracker.report(milestones::TRANSCRIPTION_DONE, "Transcription done");

        Ok(())
    }

    fn run_transcription(
        &self,
        state: &mut JobState,
        output_dir: &Path,
        tracker: &mut ProgressTracker<'_>,
    ) -> LoopResult<JobOutput> {
        self.run_pipeline(state, tracker)?;

        let name = state.track_name();
        let track = state
            .track
            .as_ref()
            .ok_or_else(|| LoopError::PipelineError("no track was scheduled".to_string()))?;

        let midi_path = output_dir.join(format!("output_{}.mid", name));
        midi::export_midi(track, &midi_path)?;

        let loop_wav_path = if self.config.export.write_loop_wav {
            let path = output_dir.join(format!("loop_{}.wav", name));
            audio::write_wav(state.loop_audio()?, &path)?;
            Some(path)
        } else {
            None
        };

        let analysis_path = if self.config.export.write_analysis {
            let path = output_dir.join("analysis.json");
            analysis::export_analysis(state, &path)?;
            Some(path)
        } else {
            None
        };

        Ok(JobOutput {
            mode: OutputMode::Transcribe,
            stem_path: state.stem_path.clone().unwrap_or_default(),
            midi_path: Some(midi_path),
            loop_wav_path,
            analysis_path,
            spectrogram_path: None,
            tempo_bpm: state.tempo()?,
            loop_window: state.loop_window,
            note_count: track.note_on_count(),
        })
    }

    fn run_raw_stem(
        &self,
        state: &JobState,
        output_dir: &Path,
        tracker: &mut ProgressTracker<'_>,
    ) -> LoopResult<JobOutput> {
        let path = output_dir.join(format!("spectrogram_{}.png", state.track_name()));
        plot::render_spectrogram(state.stem()?, &path, &self.config.plot)?;
        tracker.report(milestones::SPECTROGRAM_RENDERED, "Spectrogram rendered");

        Ok(JobOutput {
            mode: OutputMode::RawStem,
            stem_path: state.stem_path.clone().unwrap_or_default(),
            midi_path: None,
            loop_wav_path: None,
            analysis_path: None,
            spectrogram_path: Some(path),
            tempo_bpm: 0.0,
            loop_window: None,
            note_count: 0,
        })
    }
}

/// Check the input exists and the configuration is usable
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> LoopResult<()> {
    let path = input_path.as_ref();
    if !path.is_file() {
        return Err(LoopError::AudioFileError(format!(
            "Input file does not exist: {}",
            path.display()
        )));
    }
    config::validate_config(config)
}
