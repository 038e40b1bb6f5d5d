use std::fs;
use std::path::{Path, PathBuf};

use crossbeam::channel::Receiver;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::midi;
use crate::render::{Compositor, Frame, GlyphOverlay, TextOverlay};
use crate::timing::{Timeline, format_timestamp};
use crate::video::{
    Assembled, ChunkedAssembler, FfmpegEncoder, SegmentEncoder, probe_duration_us,
};

/// Inputs and outputs of one render.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub midi: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub segment_dir: PathBuf,
    pub font: Option<PathBuf>,
    /// Also write every frame as a PNG into this directory.
    pub save_frames: Option<PathBuf>,
}

pub fn render(job: &RenderJob, config: &RenderConfig) -> Result<Assembled, RenderError> {
    config.validate()?;

    info!("decoding {}", job.midi.display());
    let file = midi::load(&job.midi)?;
    let timeline = Timeline::build(&file.tracks, file.ticks_per_beat, &config.limits())?;
    info!(
        "{} notes on {} tracks, {} long",
        timeline.intervals.len(),
        file.tracks.len(),
        format_timestamp(timeline.max_us)
    );
    if timeline.dangling_note_offs > 0 {
        warn!("ignored {} unmatched note-offs", timeline.dangling_note_offs);
    }

    let palette = config.palette(file.tracks.len())?;
    let overlay: Option<Box<dyn TextOverlay>> = match &job.font {
        Some(path) => Some(Box::new(GlyphOverlay::load(path, config.font_size)?)),
        None => None,
    };
    let compositor = Compositor::new(timeline, config, palette, overlay)?;

    let audio_us = probe_duration_us(&job.audio)?;
    info!("audio {} long", format_timestamp(audio_us));

    let encoder = FfmpegEncoder::new(
        &job.segment_dir,
        &job.output,
        Some(&job.audio),
        config.width,
        config.height,
        config.fps,
    )?;
    let assembler = ChunkedAssembler::new(encoder, config.recycle, config.fps, Some(audio_us));

    let (assembled, _) = run_pipeline(compositor, assembler, job.save_frames.as_deref())?;
    info!(
        "wrote {} ({} frames in {} segments, {})",
        job.output.display(),
        assembled.frames,
        assembled.segments,
        format_timestamp(assembled.duration_us)
    );
    Ok(assembled)
}

/// Renders every frame on a producer thread and feeds the assembler on this
/// one. At most `recycle` frames wait in the channel.
pub fn run_pipeline<E: SegmentEncoder>(
    mut compositor: Compositor,
    mut assembler: ChunkedAssembler<E>,
    save_frames: Option<&Path>,
) -> Result<(Assembled, E), RenderError> {
    if let Some(dir) = save_frames {
        fs::create_dir_all(dir).map_err(|e| RenderError::io(dir, e))?;
    }

    let frame_count = compositor.frame_count();
    info!("rendering {} frames", frame_count);

    let (frame_tx, frame_rx) = crossbeam::channel::bounded::<Frame>(assembler.recycle());
    let producer = std::thread::spawn(move || {
        for index in 0..frame_count {
            // the consumer hung up after an error
            if frame_tx.send(compositor.render(index)).is_err() {
                break;
            }
        }
    });

    let consumed = consume_frames(&frame_rx, &mut assembler, save_frames);
    drop(frame_rx);
    producer
        .join()
        .map_err(|_| RenderError::Pipeline("compositor thread panicked".into()))?;

    let frames = consumed?;
    if frames != frame_count {
        return Err(RenderError::Pipeline(format!(
            "received {} of {} frames",
            frames, frame_count
        )));
    }
    assembler.finish()
}

fn consume_frames<E: SegmentEncoder>(
    frame_rx: &Receiver<Frame>,
    assembler: &mut ChunkedAssembler<E>,
    save_frames: Option<&Path>,
) -> Result<u64, RenderError> {
    let mut index: u64 = 0;
    for frame in frame_rx.iter() {
        if let Some(dir) = save_frames {
            let path = dir.join(format!("frame_{:06}.png", index));
            frame
                .save(&path)
                .map_err(|source| RenderError::FrameImage { index, source })?;
        }
        assembler.push(frame)?;
        index += 1;
        if index % assembler.recycle() as u64 == 0 {
            debug!("{} frames rendered", index);
        }
    }
    Ok(index)
}
