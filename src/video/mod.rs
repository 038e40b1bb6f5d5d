mod assembler;
mod ffmpeg;

pub use assembler::{Assembled, ChunkedAssembler, SegmentEncoder};
pub use ffmpeg::{FfmpegEncoder, probe_duration_us};
