/// One decoded track event. `tick` is the delta from the previous event of
/// the same track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub track: usize,
    pub tick: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    Tempo { micros_per_beat: u64 },
    KeySignature { sharps: i8, minor: bool },
    TimeSignature { numerator: u8, denominator: u8 },
    EndOfTrack,
    Other,
}

impl EventKind {
    pub fn is_note(&self) -> bool {
        matches!(self, EventKind::NoteOn { .. } | EventKind::NoteOff { .. })
    }
}

impl RawEvent {
    pub fn new(track: usize, tick: u64, kind: EventKind) -> Self {
        Self { track, tick, kind }
    }
}

const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_KEYS: [&str; 15] = [
    "Abm", "Ebm", "Bbm", "Fm", "Cm", "Gm", "Dm", "Am", "Em", "Bm", "F#m", "C#m", "G#m", "D#m",
    "A#m",
];

/// Display name of a key signature given as sharps (negative for flats).
pub fn key_name(sharps: i8, minor: bool) -> String {
    let idx = (sharps.clamp(-7, 7) + 7) as usize;
    if minor {
        MINOR_KEYS[idx].to_string()
    } else {
        MAJOR_KEYS[idx].to_string()
    }
}
