use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use keyfall::{RenderConfig, RenderError, RenderJob};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Renders a falling-note piano video from a MIDI file and its audio.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// MIDI file to visualize
    midi: PathBuf,

    /// Audio track muxed into the video
    audio: PathBuf,

    /// Output video file
    #[arg(short, long)]
    output: PathBuf,

    /// RON render config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// TrueType font for the text overlay
    #[arg(long)]
    font: Option<PathBuf>,

    /// Also write every frame as a PNG here
    #[arg(long)]
    save_frames: Option<PathBuf>,

    /// Where intermediate segments go
    #[arg(long, default_value = "segments")]
    segment_dir: PathBuf,

    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    start_note: Option<u8>,
    #[arg(long)]
    end_note: Option<u8>,
    #[arg(long)]
    keyboard_height: Option<u32>,

    /// Seconds of music visible above the keyboard
    #[arg(long)]
    stretch: Option<f64>,
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long)]
    speed: Option<f64>,

    #[arg(long)]
    max_tracks: Option<usize>,
    #[arg(long)]
    max_notes: Option<usize>,
    #[arg(long)]
    max_tempo_events: Option<usize>,

    /// Frames per intermediate segment
    #[arg(long)]
    recycle: Option<usize>,
}

impl Cli {
    fn render_config(&self) -> Result<RenderConfig, RenderError> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::load(path)?,
            None => RenderConfig::default(),
        };

        if let Some(value) = self.width {
            config.width = value;
        }
        if let Some(value) = self.height {
            config.height = value;
        }
        if let Some(value) = self.start_note {
            config.start_note = value;
        }
        if let Some(value) = self.end_note {
            config.end_note = value;
        }
        if let Some(value) = self.keyboard_height {
            config.keyboard_height = value;
        }
        if let Some(value) = self.stretch {
            config.stretch = value;
        }
        if let Some(value) = self.fps {
            config.fps = value;
        }
        if let Some(value) = self.speed {
            config.speed = value;
        }
        if let Some(value) = self.max_tracks {
            config.max_tracks = value;
        }
        if let Some(value) = self.max_notes {
            config.max_notes = value;
        }
        if let Some(value) = self.max_tempo_events {
            config.max_tempo_events = value;
        }
        if let Some(value) = self.recycle {
            config.recycle = value;
        }

        Ok(config)
    }

    fn job(&self) -> RenderJob {
        RenderJob {
            midi: self.midi.clone(),
            audio: self.audio.clone(),
            output: self.output.clone(),
            segment_dir: self.segment_dir.clone(),
            font: self.font.clone(),
            save_frames: self.save_frames.clone(),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = cli
        .render_config()
        .and_then(|config| keyfall::render(&cli.job(), &config));

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "keyfall", "song.mid", "song.wav", "-o", "out.mp4", "--fps", "60", "--end-note", "96",
        ]);
        let config = cli.render_config().unwrap();
        assert_eq!(config.fps, 60);
        assert_eq!(config.end_note, 96);
        assert_eq!(config.width, 1920);
        assert_eq!(cli.job().segment_dir, PathBuf::from("segments"));
    }

    #[test]
    fn output_is_required() {
        assert!(Cli::try_parse_from(["keyfall", "song.mid", "song.wav"]).is_err());
    }
}
