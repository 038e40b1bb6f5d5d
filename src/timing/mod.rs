mod tempo;
mod timeline;
mod timestamp;

pub use tempo::{DEFAULT_MICROS_PER_BEAT, TempoBreakpoint, TempoCursor, TempoMap, bpm};
pub use timeline::{
    Limits, MergedEvent, NoteInterval, TempoClock, Timeline, VoiceSlots, merge_tracks,
};
pub use timestamp::format_timestamp;
