use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("malformed tempo map: breakpoint at tick {tick} follows tick {previous}")]
    MalformedTempoMap { tick: u64, previous: u64 },

    #[error("malformed tempo map: {reason}")]
    InvalidTempo { reason: String },

    /// Recovered during timeline construction; only ever logged.
    #[error("note off without an open note: track {track}, pitch {pitch}, tick {tick}")]
    DanglingNoteOff { track: usize, pitch: u8, tick: u64 },

    #[error("more than {limit} simultaneous notes at tick {tick}")]
    NoteCapacityExceeded { limit: usize, tick: u64 },

    #[error("{count} tracks exceed the limit of {limit}")]
    TrackCapacityExceeded { count: usize, limit: usize },

    #[error("more than {limit} tempo events")]
    TempoCapacityExceeded { limit: usize },

    #[error("invalid note range {start}..={end}")]
    InvalidNoteRange { start: u8, end: u8 },

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("palette has {found} colors, {needed} needed ({tracks} tracks + 2 idle colors)")]
    PaletteTooSmall {
        found: usize,
        needed: usize,
        tracks: usize,
    },

    #[error("failed to decode MIDI file {path}: {message}")]
    MidiDecode { path: PathBuf, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load font {path}")]
    Font { path: PathBuf },

    #[error("failed to read config {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("failed to probe audio file {path}: {message}")]
    AudioProbe { path: PathBuf, message: String },

    #[error("encoder failed during {stage}: {message}")]
    Encoder { stage: String, message: String },

    #[error("failed to write frame {index}: {source}")]
    FrameImage {
        index: u64,
        #[source]
        source: image::ImageError,
    },

    #[error("pipeline stopped: {0}")]
    Pipeline(String),
}

impl RenderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RenderError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn encoder(stage: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Encoder {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
