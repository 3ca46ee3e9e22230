//! Analysis types shared by the passes, plus the JSON job report

use crate::audio::JobState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Percussion voice assigned to an onset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Voice {
    Kick,
    Snare,
    ClosedHiHat,
}

impl Voice {
    /// General MIDI drum map note number
    pub fn midi_note(&self) -> u8 {
        match self {
            Voice::Kick => 36,        // C1 bass drum
            Voice::Snare => 38,       // D1 acoustic snare
            Voice::ClosedHiHat => 42, // F#1 closed hi-hat
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Voice::Kick => "kick",
            Voice::Snare => "snare",
            Voice::ClosedHiHat => "closed-hihat",
        }
    }
}

/// Selected loop span in seconds, relative to the start of the stem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopWindow {
    pub start_sec: f32,
    pub end_sec: f32,
}

impl LoopWindow {
    pub fn duration_sec(&self) -> f32 {
        self.end_sec - self.start_sec
    }
}

/// Spectral measurements behind a voice decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceFeatures {
    /// Summed magnitude below the low band edge
    pub low_energy: f32,
    /// Summed magnitude above the high band edge
    pub high_energy: f32,
    /// Mean spectral centroid over the segment's frames
    pub avg_centroid_hz: f32,
}

/// A detected transient and its voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetEvent {
    /// Seconds from the loop start
    pub time_sec: f32,
    pub voice: Voice,
    /// `None` when the segment was empty and the voice is the default
    pub features: Option<VoiceFeatures>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteKind {
    On,
    Off,
}

/// One tick-stamped note message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Absolute tick
    pub tick: u64,
    /// Ticks since the previous event, never negative
    pub delta: u64,
    pub kind: NoteKind,
    pub voice: Voice,
    pub velocity: u8,
}

/// Note sequence sorted ascending by tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub tempo_bpm: f32,
    pub ticks_per_beat: u16,
    pub events: Vec<NoteEvent>,
}

impl Track {
    pub fn note_on_count(&self) -> usize {
        self.events.iter().filter(|e| e.kind == NoteKind::On).count()
    }
}

/// `analysis.json` contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub version: String,
    pub track_name: String,
    pub sample_rate: u32,
    pub stem_duration_sec: f32,
    pub tempo_bpm: f32,
    pub loop_window: Option<LoopWindow>,
    pub onsets: Vec<OnsetEvent>,
    pub voice_counts: BTreeMap<String, usize>,
    pub note_events: usize,
}

/// Build the report from a finished job
pub fn build_report(state: &JobState) -> AnalysisReport {
    let mut voice_counts = BTreeMap::new();
    for onset in &state.onsets {
        *voice_counts.entry(onset.voice.name().to_string()).or_insert(0) += 1;
    }

    AnalysisReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        track_name: state.track_name(),
        sample_rate: state.stem.as_ref().map(|s| s.sample_rate()).unwrap_or(0),
        stem_duration_sec: state.stem.as_ref().map(|s| s.duration_sec()).unwrap_or(0.0),
        tempo_bpm: state.tempo_bpm.unwrap_or(0.0),
        loop_window: state.loop_window,
        onsets: state.onsets.clone(),
        voice_counts,
        note_events: state.track.as_ref().map(|t| t.events.len()).unwrap_or(0),
    }
}

/// Export analysis results to JSON
pub fn export_analysis(state: &JobState, path: &Path) -> crate::LoopResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&build_report(state))?;
    std::fs::write(path, json)?;

    tracing::info!(path = %path.display(), "Exported analysis report");
    Ok(())
}
