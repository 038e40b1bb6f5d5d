use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use super::assembler::SegmentEncoder;
use crate::error::RenderError;
use crate::render::Frame;

const SEGMENT_PREFIX: &str = "segment_";
const SEGMENT_EXT: &str = "mp4";
const CONCAT_LIST: &str = "segments.txt";

fn seconds(micros: u64) -> String {
    format!("{:.6}", micros as f64 / 1_000_000.0)
}

/// Drives the system `ffmpeg` binary: raw RGB frames go in on stdin, one
/// H.264 segment comes out per call.
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    segment_dir: PathBuf,
    output: PathBuf,
    audio: Option<PathBuf>,
    width: u32,
    height: u32,
    fps: u32,
}

impl FfmpegEncoder {
    /// Prepares `segment_dir`, removing segments left over from earlier runs.
    pub fn new(
        segment_dir: &Path,
        output: &Path,
        audio: Option<&Path>,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, RenderError> {
        fs::create_dir_all(segment_dir).map_err(|e| RenderError::io(segment_dir, e))?;
        clear_stale_segments(segment_dir)?;

        Ok(Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            segment_dir: segment_dir.to_path_buf(),
            output: output.to_path_buf(),
            audio: audio.map(Path::to_path_buf),
            width,
            height,
            fps,
        })
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.segment_dir
            .join(format!("{}{:04}.{}", SEGMENT_PREFIX, index, SEGMENT_EXT))
    }

    fn segment_args(&self, path: &Path, hold_us: u64) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", self.width, self.height),
            "-r".into(),
            self.fps.to_string(),
            "-i".into(),
            "-".into(),
        ];
        if hold_us > 0 {
            args.push("-vf".into());
            args.push(format!(
                "tpad=stop_mode=clone:stop_duration={}",
                seconds(hold_us)
            ));
        }
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-r".into(),
            self.fps.to_string(),
            path.display().to_string(),
        ]);
        args
    }

    fn concat_args(&self, list: &Path, duration_us: u64) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list.display().to_string(),
        ];
        match &self.audio {
            Some(audio) => args.extend([
                "-i".into(),
                audio.display().to_string(),
                "-map".into(),
                "0:v:0".into(),
                "-map".into(),
                "1:a:0".into(),
                "-c:v".into(),
                "copy".into(),
                "-c:a".into(),
                "aac".into(),
                "-af".into(),
                "apad".into(),
            ]),
            None => args.extend(["-c:v".to_string(), "copy".to_string()]),
        }
        args.extend([
            "-t".into(),
            seconds(duration_us),
            self.output.display().to_string(),
        ]);
        args
    }
}

impl SegmentEncoder for FfmpegEncoder {
    fn encode_segment(
        &mut self,
        index: usize,
        frames: &[Frame],
        hold_us: u64,
    ) -> Result<PathBuf, RenderError> {
        let path = self.segment_path(index);
        let stage = format!("segment {}", index);
        let mut child = Command::new(&self.ffmpeg)
            .args(self.segment_args(&path, hold_us))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RenderError::encoder(&stage, e.to_string()))?;

        // A write fails once ffmpeg has exited; its stderr says why.
        let mut write_error = None;
        if let Some(mut stdin) = child.stdin.take() {
            for frame in frames {
                if let Err(e) = stdin.write_all(frame.as_raw()) {
                    write_error = Some(e);
                    break;
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| RenderError::encoder(&stage, e.to_string()))?;
        if !output.status.success() || write_error.is_some() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = match write_error {
                _ if !stderr.is_empty() => stderr,
                Some(e) => e.to_string(),
                None => format!("ffmpeg exited with {}", output.status),
            };
            return Err(RenderError::encoder(stage, message));
        }

        debug!("wrote {}", path.display());
        Ok(path)
    }

    fn concat(&mut self, segments: &[PathBuf], duration_us: u64) -> Result<(), RenderError> {
        let list = self.segment_dir.join(CONCAT_LIST);
        fs::write(&list, concat_list(segments)).map_err(|e| RenderError::io(&list, e))?;

        let output = Command::new(&self.ffmpeg)
            .args(self.concat_args(&list, duration_us))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RenderError::encoder("concat", e.to_string()))?;
        if !output.status.success() {
            return Err(RenderError::encoder(
                "concat",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

/// Input file for ffmpeg's concat demuxer.
fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|path| {
            let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            let escaped = absolute.display().to_string().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

fn clear_stale_segments(dir: &Path) -> Result<(), RenderError> {
    let entries = fs::read_dir(dir).map_err(|e| RenderError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| RenderError::io(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let stale = name == CONCAT_LIST
            || (name.starts_with(SEGMENT_PREFIX) && name.ends_with(&format!(".{}", SEGMENT_EXT)));
        if stale {
            fs::remove_file(&path).map_err(|e| RenderError::io(&path, e))?;
        }
    }
    Ok(())
}

/// Duration of a media file as reported by `ffprobe`.
pub fn probe_duration_us(path: &Path) -> Result<u64, RenderError> {
    let probe_error = |message: String| RenderError::AudioProbe {
        path: path.to_path_buf(),
        message,
    };

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| probe_error(e.to_string()))?;
    if !output.status.success() {
        return Err(probe_error(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    parse_duration_us(&text)
        .ok_or_else(|| probe_error(format!("unexpected output '{}'", text.trim())))
}

fn parse_duration_us(text: &str) -> Option<u64> {
    let seconds: f64 = text.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| (seconds * 1_000_000.0).round() as u64)
}
