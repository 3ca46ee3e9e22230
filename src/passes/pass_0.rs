//! Pass 0: Stem Separation & Loading

use crate::audio::{load_audio_file, JobState};
use crate::config::Config;
use crate::error::{LoopError, Result as LoopResult};
use crate::separation::Separator;

/// Separate the configured stem from the job's input and load it
pub fn run(state: &mut JobState, config: &Config, separator: &dyn Separator) -> LoopResult<()> {
    let stem_name = &config.separation.stem;
    tracing::info!(input = %state.input_path.display(), stem = %stem_name, "Pass 0: Stem separation");

    let stem_path = separator.separate(&state.input_path, stem_name)?;
    let stem = load_audio_file(&stem_path)?;

    if stem.is_empty() {
        return Err(LoopError::EmptyInput);
    }

    tracing::info!(
        path = %stem_path.display(),
        duration_sec = stem.duration_sec(),
        sample_rate = stem.sample_rate(),
        "Stem loaded"
    );

    state.stem_path = Some(stem_path);
    state.stem = Some(stem);
    Ok(())
}
