use std::fs;
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::RenderError;
use crate::events::{EventKind, RawEvent};

/// One real second per "beat" for files timed in SMPTE frames.
const TIMECODE_MICROS_PER_BEAT: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct MidiFile {
    pub ticks_per_beat: u16,
    /// Events per track; track 0 carries the tempo map.
    pub tracks: Vec<Vec<RawEvent>>,
}

pub fn load(path: &Path) -> Result<MidiFile, RenderError> {
    let data = fs::read(path).map_err(|e| RenderError::io(path, e))?;
    decode(&data).map_err(|message| RenderError::MidiDecode {
        path: path.to_path_buf(),
        message,
    })
}

pub fn decode(data: &[u8]) -> Result<MidiFile, String> {
    let smf = Smf::parse(data).map_err(|e| e.to_string())?;

    let (ticks_per_beat, timecode) = match smf.header.timing {
        Timing::Metrical(tpb) => (tpb.as_int(), false),
        Timing::Timecode(fps, subframes) => (fps.as_int() as u16 * subframes as u16, true),
    };
    if ticks_per_beat == 0 {
        return Err("zero ticks per beat".into());
    }

    let mut tracks: Vec<Vec<RawEvent>> = smf
        .tracks
        .iter()
        .enumerate()
        .map(|(track, events)| {
            events
                .iter()
                .map(|event| RawEvent::new(track, event.delta.as_int() as u64, convert(&event.kind)))
                .collect()
        })
        .collect();

    if timecode {
        // tempo is fixed by the frame rate; ignore tempo events
        for track in tracks.iter_mut() {
            for event in track.iter_mut() {
                if matches!(event.kind, EventKind::Tempo { .. }) {
                    event.kind = EventKind::Other;
                }
            }
        }
        if tracks.is_empty() {
            tracks.push(Vec::new());
        }
        let tempo = EventKind::Tempo {
            micros_per_beat: TIMECODE_MICROS_PER_BEAT,
        };
        tracks[0].insert(0, RawEvent::new(0, 0, tempo));
    }

    Ok(MidiFile {
        ticks_per_beat,
        tracks,
    })
}

fn convert(kind: &TrackEventKind) -> EventKind {
    match kind {
        TrackEventKind::Midi { message, .. } => match *message {
            MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                pitch: key.as_int(),
                velocity: vel.as_int(),
            },
            MidiMessage::NoteOff { key, .. } => EventKind::NoteOff {
                pitch: key.as_int(),
            },
            _ => EventKind::Other,
        },
        TrackEventKind::Meta(meta) => match *meta {
            MetaMessage::Tempo(tempo) => EventKind::Tempo {
                micros_per_beat: tempo.as_int() as u64,
            },
            MetaMessage::KeySignature(sharps, minor) => EventKind::KeySignature { sharps, minor },
            MetaMessage::TimeSignature(numerator, denominator_pow, _, _) => {
                EventKind::TimeSignature {
                    numerator,
                    denominator: 1u8.checked_shl(denominator_pow as u32).unwrap_or(0),
                }
            }
            MetaMessage::EndOfTrack => EventKind::EndOfTrack,
            _ => EventKind::Other,
        },
        _ => EventKind::Other,
    }
}
