//! Stem separation behind a capability trait
//!
//! The pipeline only knows "give me the path of the `<stem>` stem for this
//! input". [`DemucsSeparator`] shells out to the separation tool and then
//! looks for its output at a fixed, convention-based location.

use crate::config::SeparationConfig;
use crate::error::{LoopError, Result as LoopResult};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Produces a stem waveform file for an input recording
pub trait Separator: Send + Sync {
    /// Return the path of the separated `stem` for `input`
    fn separate(&self, input: &Path, stem: &str) -> LoopResult<PathBuf>;
}

/// Runs `<command> -n <model> --two-stems=<stem> -o <root> <input>`
#[derive(Debug, Clone)]
pub struct DemucsSeparator {
    command: String,
    model: String,
    output_root: PathBuf,
}

impl DemucsSeparator {
    pub fn new(config: &SeparationConfig) -> Self {
        Self {
            command: config.command.clone(),
            model: config.model.clone(),
            output_root: config.output_root.clone(),
        }
    }
}

/// Where the separation tool writes a stem: `<root>/<model>/<input base name>/<stem>.wav`
pub fn expected_stem_path(output_root: &Path, model: &str, input: &Path, stem: &str) -> PathBuf {
    let base = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    output_root
        .join(model)
        .join(base)
        .join(format!("{}.wav", stem))
}

impl Separator for DemucsSeparator {
    fn separate(&self, input: &Path, stem: &str) -> LoopResult<PathBuf> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-n")
            .arg(&self.model)
            .arg(format!("--two-stems={}", stem))
            .arg("-o")
            .arg(&self.output_root)
            .arg(input);

        tracing::info!(command = ?cmd, "Running stem separation");

        let output = cmd.output().map_err(|e| {
            LoopError::SeparationFailed(format!("could not run {}: {}", self.command, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoopError::SeparationFailed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let stem_path = expected_stem_path(&self.output_root, &self.model, input, stem);
        if !stem_path.exists() {
            return Err(LoopError::SeparationOutputMissing(stem_path));
        }

        Ok(stem_path)
    }
}

/// For inputs that already are the isolated stem
#[derive(Debug, Clone, Copy, Default)]
pub struct PreSeparated;

impl Separator for PreSeparated {
    fn separate(&self, input: &Path, _stem: &str) -> LoopResult<PathBuf> {
        if input.exists() {
            Ok(input.to_path_buf())
        } else {
            Err(LoopError::SeparationOutputMissing(input.to_path_buf()))
        }
    }
}
