use std::fs;
use std::path::Path;

use image::Rgb;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::timing::Limits;

const TRACK_COLORS: [[u8; 3]; 8] = [
    [255, 127, 0],
    [0, 170, 255],
    [120, 220, 60],
    [240, 70, 160],
    [250, 210, 40],
    [150, 90, 255],
    [40, 220, 200],
    [255, 80, 70],
];
const IDLE_WHITE: [u8; 3] = [235, 235, 235];
const IDLE_BLACK: [u8; 3] = [20, 20, 20];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Lowest displayed pitch, inclusive.
    pub start_note: u8,
    /// Highest displayed pitch, inclusive.
    pub end_note: u8,
    pub keyboard_height: u32,
    /// Seconds of music visible above the keyboard.
    pub stretch: f64,
    pub fps: u32,
    /// Playback speed multiplier.
    pub speed: f64,
    pub max_tracks: usize,
    pub max_notes: usize,
    pub max_tempo_events: usize,
    /// Frames per intermediate segment.
    pub recycle: usize,
    pub font_size: f32,
    /// One color per track followed by the idle white and idle black key colors.
    pub palette: Option<Vec<[u8; 3]>>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            width: 1920,
            height: 1080,
            start_note: 21,
            end_note: 108,
            keyboard_height: 200,
            stretch: 2.0,
            fps: 30,
            speed: 1.0,
            max_tracks: limits.max_tracks,
            max_notes: limits.max_notes,
            max_tempo_events: limits.max_tempo_events,
            recycle: 240,
            font_size: 28.0,
            palette: None,
        }
    }
}

impl RenderConfig {
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let ron_string = fs::read_to_string(path).map_err(|e| RenderError::io(path, e))?;
        let config: RenderConfig = ron::from_str(&ron_string).map_err(|e| RenderError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), RenderError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| RenderError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        fs::write(path, ron_string).map_err(|e| RenderError::io(path, e))
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidDimensions(format!(
                "{}x{}",
                self.width, self.height
            )));
        }
        if self.keyboard_height >= self.height {
            return Err(RenderError::InvalidDimensions(format!(
                "keyboard height {} leaves no room in {} rows",
                self.keyboard_height, self.height
            )));
        }
        if self.start_note > self.end_note || self.end_note > 127 {
            return Err(RenderError::InvalidNoteRange {
                start: self.start_note,
                end: self.end_note,
            });
        }
        if self.fps == 0 || self.recycle == 0 {
            return Err(RenderError::InvalidDimensions(
                "fps and recycle must be positive".into(),
            ));
        }
        if !(self.speed > 0.0 && self.stretch > 0.0) {
            return Err(RenderError::InvalidDimensions(
                "speed and stretch must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_tracks: self.max_tracks,
            max_notes: self.max_notes,
            max_tempo_events: self.max_tempo_events,
        }
    }

    /// Length of the falling window in microseconds.
    pub fn fall_us(&self) -> u64 {
        (self.stretch * 1_000_000.0).round() as u64
    }

    pub fn palette(&self, tracks: usize) -> Result<Palette, RenderError> {
        match &self.palette {
            Some(colors) => Palette::from_colors(colors, tracks),
            None => Ok(Palette::default_for(tracks)),
        }
    }
}

/// Track colors indexed by track number, then the two idle key colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<Rgb<u8>>,
}

impl Palette {
    pub fn from_colors(colors: &[[u8; 3]], tracks: usize) -> Result<Self, RenderError> {
        let needed = tracks + 2;
        if colors.len() < needed {
            return Err(RenderError::PaletteTooSmall {
                found: colors.len(),
                needed,
                tracks,
            });
        }
        Ok(Self {
            colors: colors.iter().copied().map(Rgb).collect(),
        })
    }

    pub fn default_for(tracks: usize) -> Self {
        let mut colors: Vec<Rgb<u8>> = TRACK_COLORS
            .iter()
            .cycle()
            .take(tracks.max(1))
            .copied()
            .map(Rgb)
            .collect();
        colors.push(Rgb(IDLE_WHITE));
        colors.push(Rgb(IDLE_BLACK));
        Self { colors }
    }

    fn track_count(&self) -> usize {
        self.colors.len() - 2
    }

    pub fn track(&self, track: usize) -> Rgb<u8> {
        self.colors[track % self.track_count()]
    }

    pub fn idle_white(&self) -> Rgb<u8> {
        self.colors[self.colors.len() - 2]
    }

    pub fn idle_black(&self) -> Rgb<u8> {
        self.colors[self.colors.len() - 1]
    }
}
