use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::RenderError;
use crate::render::Frame;

/// Encodes groups of frames into segment files and joins them at the end.
pub trait SegmentEncoder {
    /// Writes segment `index`. A non-zero `hold_us` keeps the last frame on
    /// screen for that much longer.
    fn encode_segment(
        &mut self,
        index: usize,
        frames: &[Frame],
        hold_us: u64,
    ) -> Result<PathBuf, RenderError>;

    /// Joins the segments in order with the audio track into the final
    /// output of exactly `duration_us`.
    fn concat(&mut self, segments: &[PathBuf], duration_us: u64) -> Result<(), RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assembled {
    pub segments: usize,
    pub frames: u64,
    pub duration_us: u64,
}

/// Buffers at most `recycle` frames before handing them to the encoder.
pub struct ChunkedAssembler<E> {
    encoder: E,
    recycle: usize,
    fps: u32,
    audio_us: Option<u64>,
    buffer: Vec<Frame>,
    segments: Vec<PathBuf>,
    frames: u64,
}

impl<E: SegmentEncoder> ChunkedAssembler<E> {
    pub fn new(encoder: E, recycle: usize, fps: u32, audio_us: Option<u64>) -> Self {
        let recycle = recycle.max(1);
        Self {
            encoder,
            recycle,
            fps: fps.max(1),
            audio_us,
            buffer: Vec::with_capacity(recycle),
            segments: Vec::new(),
            frames: 0,
        }
    }

    pub fn recycle(&self) -> usize {
        self.recycle
    }

    /// A full buffer is only flushed once the next frame shows up, so the
    /// last segment is still open when the stream ends.
    pub fn push(&mut self, frame: Frame) -> Result<(), RenderError> {
        if self.buffer.len() >= self.recycle {
            self.flush(0)?;
        }
        self.buffer.push(frame);
        self.frames += 1;
        Ok(())
    }

    fn flush(&mut self, hold_us: u64) -> Result<(), RenderError> {
        let index = self.segments.len();
        debug!(
            "encoding segment {} ({} frames, hold {} us)",
            index,
            self.buffer.len(),
            hold_us
        );
        let path = self.encoder.encode_segment(index, &self.buffer, hold_us)?;
        self.segments.push(path);
        self.buffer.clear();
        Ok(())
    }

    pub fn video_us(&self) -> u64 {
        self.frames * 1_000_000 / self.fps as u64
    }

    pub fn finish(mut self) -> Result<(Assembled, E), RenderError> {
        if self.frames == 0 {
            return Err(RenderError::Pipeline("no frames to encode".into()));
        }

        let video_us = self.video_us();
        let hold_us = self
            .audio_us
            .map_or(0, |audio_us| audio_us.saturating_sub(video_us));
        if hold_us > 0 {
            info!("holding the last frame for {} us to match the audio", hold_us);
        }
        self.flush(hold_us)?;

        let duration_us = video_us + hold_us;
        if let Some(audio_us) = self.audio_us {
            if audio_us < duration_us {
                info!("padding audio by {} us", duration_us - audio_us);
            }
        }

        info!("joining {} segments", self.segments.len());
        self.encoder.concat(&self.segments, duration_us)?;

        let assembled = Assembled {
            segments: self.segments.len(),
            frames: self.frames,
            duration_us,
        };
        Ok((assembled, self.encoder))
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[derive(Default)]
    struct MemoryEncoder {
        segments: Vec<(Vec<Frame>, u64)>,
        joined: Option<(Vec<PathBuf>, u64)>,
    }

    impl SegmentEncoder for MemoryEncoder {
        fn encode_segment(
            &mut self,
            index: usize,
            frames: &[Frame],
            hold_us: u64,
        ) -> Result<PathBuf, RenderError> {
            assert_eq!(index, self.segments.len());
            self.segments.push((frames.to_vec(), hold_us));
            Ok(PathBuf::from(format!("segment_{:04}.mp4", index)))
        }

        fn concat(&mut self, segments: &[PathBuf], duration_us: u64) -> Result<(), RenderError> {
            self.joined = Some((segments.to_vec(), duration_us));
            Ok(())
        }
    }

    fn frame(value: u8) -> Frame {
        Frame::from_pixel(2, 2, Rgb([value, 0, 0]))
    }

    #[test]
    fn splits_ten_frames_into_four_four_two() {
        let mut assembler = ChunkedAssembler::new(MemoryEncoder::default(), 4, 10, None);
        let frames: Vec<Frame> = (0..10).map(frame).collect();
        for f in frames.iter().cloned() {
            assembler.push(f).unwrap();
        }
        let (assembled, encoder) = assembler.finish().unwrap();

        let sizes: Vec<usize> = encoder.segments.iter().map(|(f, _)| f.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(assembled.segments, 3);

        let joined: Vec<Frame> = encoder
            .segments
            .iter()
            .flat_map(|(f, _)| f.iter().cloned())
            .collect();
        assert_eq!(joined, frames);

        let (paths, duration_us) = encoder.joined.unwrap();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("segment_0000.mp4"),
                PathBuf::from("segment_0001.mp4"),
                PathBuf::from("segment_0002.mp4"),
            ]
        );
        assert_eq!(duration_us, 1_000_000);
    }

    #[test]
    fn never_buffers_more_than_recycle_frames() {
        let mut assembler = ChunkedAssembler::new(MemoryEncoder::default(), 3, 30, None);
        for i in 0..20 {
            assembler.push(frame(i)).unwrap();
            assert!(assembler.buffer.len() <= 3);
        }
    }

    #[test]
    fn holds_last_frame_when_audio_is_longer() {
        let mut assembler = ChunkedAssembler::new(MemoryEncoder::default(), 4, 4, Some(3_500_000));
        for i in 0..8 {
            assembler.push(frame(i)).unwrap();
        }
        let (assembled, encoder) = assembler.finish().unwrap();

        let holds: Vec<u64> = encoder.segments.iter().map(|(_, h)| *h).collect();
        assert_eq!(holds, vec![0, 1_500_000]);
        assert_eq!(assembled.duration_us, 3_500_000);
        assert_eq!(encoder.joined.map(|(_, d)| d), Some(3_500_000));
    }

    #[test]
    fn keeps_video_length_when_audio_is_shorter() {
        let mut assembler = ChunkedAssembler::new(MemoryEncoder::default(), 4, 4, Some(500_000));
        for i in 0..6 {
            assembler.push(frame(i)).unwrap();
        }
        let (assembled, encoder) = assembler.finish().unwrap();
        assert!(encoder.segments.iter().all(|(_, hold)| *hold == 0));
        assert_eq!(assembled.duration_us, 1_500_000);
    }

    #[test]
    fn refuses_an_empty_stream() {
        let assembler = ChunkedAssembler::new(MemoryEncoder::default(), 4, 30, None);
        assert!(matches!(assembler.finish(), Err(RenderError::Pipeline(_))));
    }
}
