//! MIDI export functionality

use crate::analysis::{NoteKind, Track};
use crate::error::{LoopError, Result as LoopResult};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;

/// General MIDI percussion channel (channel 10, zero-based)
pub const DRUM_CHANNEL: u8 = 9;

const TRACK_NAME: &[u8] = b"loop2midi drums";

/// Microseconds per quarter note for a tempo, clamped to the 24-bit range
pub fn tempo_to_uspq(tempo_bpm: f32) -> u32 {
    let uspq = (60_000_000.0 / tempo_bpm as f64).round();
    uspq.clamp(1.0, 0x00FF_FFFF as f64) as u32
}

/// Serialize a track as a single-track standard MIDI file
pub fn track_to_smf_bytes(track: &Track) -> LoopResult<Vec<u8>> {
    let mut events: Vec<TrackEvent> = Vec::with_capacity(track.events.len() + 3);

    events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(TRACK_NAME)),
    });
    events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo_to_uspq(track.tempo_bpm)))),
    });

    for note in &track.events {
        let key = u7::from(note.voice.midi_note());
        let message = match note.kind {
            NoteKind::On => MidiMessage::NoteOn {
                key,
                vel: u7::from(note.velocity.min(127)),
            },
            NoteKind::Off => MidiMessage::NoteOff {
                key,
                vel: u7::from(0),
            },
        };
        let delta = note.delta.min(u28::max_value().as_int() as u64) as u32;
        events.push(TrackEvent {
            delta: u28::from(delta),
            kind: TrackEventKind::Midi {
                channel: u4::from(DRUM_CHANNEL),
                message,
            },
        });
    }

    events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::from(track.ticks_per_beat.min(0x7FFF))),
        },
        tracks: vec![events],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| LoopError::MidiExportError(format!("Failed to write MIDI data: {:?}", e)))?;
    Ok(bytes)
}

/// Write a track to a `.mid` file
pub fn export_midi(track: &Track, path: &Path) -> LoopResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = track_to_smf_bytes(track)?;
    std::fs::write(path, bytes)?;

    tracing::info!(
        path = %path.display(),
        notes = track.note_on_count(),
        "Exported MIDI"
    );
    Ok(())
}
