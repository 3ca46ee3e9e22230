//! Pass 4: Tick Scheduling & Quantization

use crate::analysis::{NoteEvent, NoteKind, OnsetEvent, Track};
use crate::audio::JobState;
use crate::config::Config;
use crate::error::{LoopError, Result as LoopResult};

/// Length of every emitted note
pub const NOTE_DURATION_SEC: f32 = 0.1;
/// Velocity of every note-on
pub const NOTE_ON_VELOCITY: u8 = 100;

/// Convert seconds to ticks at a tempo, rounded to the nearest tick
pub fn seconds_to_ticks(time_sec: f32, tempo_bpm: f32, ticks_per_beat: u16) -> u64 {
    let ticks = time_sec as f64 * (tempo_bpm as f64 / 60.0) * ticks_per_beat as f64;
    ticks.round().max(0.0) as u64
}

/// Snap a tick to the nearest grid line
///
/// The grid has `quantization_division` lines per whole note
/// (`ticks_per_beat * 4 / division` ticks apart). A division of 0 leaves the
/// tick untouched.
pub fn quantize_ticks(ticks: u64, ticks_per_beat: u16, quantization_division: u32) -> u64 {
    if quantization_division == 0 {
        return ticks;
    }
    let grid = ticks_per_beat as f64 * 4.0 / quantization_division as f64;
    ((ticks as f64 / grid).round() * grid).round().max(0.0) as u64
}

/// Turn classified onsets into a sorted, delta-encoded note track
///
/// Each onset yields a note-on at its (quantized) tick and a note-off
/// [`NOTE_DURATION_SEC`] later. Events are stably sorted by tick so equal
/// ticks keep generation order. Deltas are clamped at zero.
pub fn schedule(
    onsets: &[OnsetEvent],
    tempo_bpm: f32,
    ticks_per_beat: u16,
    quantization_division: u32,
) -> LoopResult<Track> {
    if !tempo_bpm.is_finite() || tempo_bpm <= 0.0 {
        return Err(LoopError::InvalidTempo(tempo_bpm));
    }

    let duration_ticks = seconds_to_ticks(NOTE_DURATION_SEC, tempo_bpm, ticks_per_beat);
    let mut events: Vec<NoteEvent> = Vec::with_capacity(onsets.len() * 2);

    for onset in onsets {
        let raw = seconds_to_ticks(onset.time_sec, tempo_bpm, ticks_per_beat);
        let tick = quantize_ticks(raw, ticks_per_beat, quantization_division);

        events.push(NoteEvent {
            tick,
            delta: 0,
            kind: NoteKind::On,
            voice: onset.voice,
            velocity: NOTE_ON_VELOCITY,
        });
        events.push(NoteEvent {
            tick: tick + duration_ticks,
            delta: 0,
            kind: NoteKind::Off,
            voice: onset.voice,
            velocity: 0,
        });
    }

    events.sort_by_key(|e| e.tick);

    let mut previous = 0u64;
    for event in &mut events {
        event.delta = event.tick.saturating_sub(previous);
        previous = event.tick;
    }

    Ok(Track {
        tempo_bpm,
        ticks_per_beat,
        events,
    })
}

/// Schedule the classified onsets of the loop
pub fn run(state: &mut JobState, config: &Config) -> LoopResult<()> {
    let tempo_bpm = state.tempo()?;
    let sc = &config.schedule;

    let track = schedule(&state.onsets, tempo_bpm, sc.ticks_per_beat, sc.quantization_division)?;

    tracing::info!(
        notes = track.note_on_count(),
        events = track.events.len(),
        quantization = sc.quantization_division,
        "Pass 4: Notes scheduled"
    );

    state.track = Some(track);
    Ok(())
}
