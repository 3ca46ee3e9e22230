//! Error types for the loop-to-MIDI system

use std::path::PathBuf;
use thiserror::Error;

/// Error type for loop selection and transcription jobs
///
/// Every variant is terminal for the job that raised it. Nothing in the
/// pipeline retries.
#[derive(Debug, Clone, Error)]
pub enum LoopError {
    /// E001: Invalid audio format (e.g., more than two channels)
    #[error("E001: Invalid audio format - {0}")]
    InvalidAudioFormat(String),
    /// E002: Audio file I/O error
    #[error("E002: Audio file I/O error - {0}")]
    AudioFileError(String),
    /// E003: Configuration validation failed
    #[error("E003: Configuration validation failed - {0}")]
    ConfigValidationFailed(String),
    /// E004: The external separation process could not run or exited non-zero
    #[error("E004: Stem separation failed - {0}")]
    SeparationFailed(String),
    /// E005: Separation finished but the stem file is not where it should be
    #[error("E005: Separation produced no stem at {}", .0.display())]
    SeparationOutputMissing(PathBuf),
    /// E006: Zero-length audio
    #[error("E006: Input audio contains no samples")]
    EmptyInput,
    /// E007: Tempo is not a positive finite number
    #[error("E007: Invalid tempo {0} BPM")]
    InvalidTempo(f32),
    /// E008: A pass ran without the state produced by an earlier pass
    #[error("E008: Processing pipeline error - {0}")]
    PipelineError(String),
    /// E009: MIDI export error
    #[error("E009: MIDI export error - {0}")]
    MidiExportError(String),
    /// E010: Analysis export error
    #[error("E010: Analysis export error - {0}")]
    AnalysisExportError(String),
    /// E011: Spectrogram rendering error
    #[error("E011: Spectrogram rendering error - {0}")]
    PlotError(String),
    /// E012: Unknown job identifier
    #[error("E012: Job not found - {0}")]
    JobNotFound(String),
    /// E013: Job lifecycle violation (e.g., acknowledging a running job)
    #[error("E013: Invalid job state - {0}")]
    JobStateError(String),
}

impl From<std::io::Error> for LoopError {
    fn from(err: std::io::Error) -> Self {
        LoopError::AudioFileError(format!("File I/O error: {}", err))
    }
}

impl From<hound::Error> for LoopError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => LoopError::AudioFileError(e.to_string()),
            other => LoopError::InvalidAudioFormat(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for LoopError {
    fn from(err: serde_json::Error) -> Self {
        LoopError::AnalysisExportError(format!("JSON serialization error: {}", err))
    }
}

/// Result type alias for loop-to-MIDI operations
pub type Result<T> = std::result::Result<T, LoopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_codes() {
        let err = LoopError::SeparationOutputMissing(PathBuf::from("separated/htdemucs/song/drums.wav"));
        let msg = err.to_string();
        assert!(msg.starts_with("E005"));
        assert!(msg.contains("separated/htdemucs/song/drums.wav"));

        assert_eq!(
            LoopError::EmptyInput.to_string(),
            "E006: Input audio contains no samples"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        match LoopError::from(io) {
            LoopError::AudioFileError(msg) => assert!(msg.contains("gone")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
