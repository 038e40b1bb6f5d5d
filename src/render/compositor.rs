use image::Rgb;

use super::frame::{Frame, fill_rect, shade};
use super::keyboard::{KeyGeometry, Keyboard};
use super::text::TextOverlay;
use crate::config::{Palette, RenderConfig};
use crate::error::RenderError;
use crate::timing::{NoteInterval, TempoCursor, Timeline, format_timestamp};

const BACKGROUND: Rgb<u8> = Rgb([12, 12, 16]);
const KEY_BORDER: Rgb<u8> = Rgb([48, 48, 52]);
const TEXT_COLOR: Rgb<u8> = Rgb([230, 230, 230]);
const KEY_MARGIN: u32 = 1;
/// Black key length relative to the keyboard strip.
const BLACK_KEY_LENGTH: f64 = 0.62;
const TEXT_MARGIN: i32 = 16;

/// Turns a note timeline into frames, one time step at a time.
///
/// Frames are expected in increasing time order; the rolling state is rebuilt
/// with [`Compositor::seek`] whenever a caller jumps backwards.
pub struct Compositor {
    timeline: Timeline,
    keyboard: Keyboard,
    palette: Palette,
    overlay: Option<Box<dyn TextOverlay>>,
    width: u32,
    height: u32,
    keyboard_height: u32,
    fall_us: u64,
    fps: u32,
    speed: f64,
    /// Indices of admitted intervals, ordered by start time.
    seen: Vec<usize>,
    next: usize,
    tempo_cursor: TempoCursor,
    last_time: Option<u64>,
}

impl Compositor {
    pub fn new(
        timeline: Timeline,
        config: &RenderConfig,
        palette: Palette,
        overlay: Option<Box<dyn TextOverlay>>,
    ) -> Result<Self, RenderError> {
        config.validate()?;
        let keyboard = Keyboard::new(config.start_note, config.end_note, config.width)?;

        Ok(Self {
            timeline,
            keyboard,
            palette,
            overlay,
            width: config.width,
            height: config.height,
            keyboard_height: config.keyboard_height,
            fall_us: config.fall_us(),
            fps: config.fps,
            speed: config.speed,
            seen: Vec::new(),
            next: 0,
            tempo_cursor: TempoCursor::default(),
            last_time: None,
        })
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Playback time shown by frame `index`.
    pub fn frame_time(&self, index: u64) -> u64 {
        (index as f64 * 1_000_000.0 * self.speed / self.fps as f64).round() as u64
    }

    /// Number of frames needed to reach the last note endpoint.
    pub fn frame_count(&self) -> u64 {
        let frames = self.timeline.max_us as f64 * self.fps as f64 / (1_000_000.0 * self.speed);
        frames.floor() as u64 + 1
    }

    fn falling_rows(&self) -> u32 {
        self.height - self.keyboard_height
    }

    /// Rebuilds the rolling state for playback time `curr` from scratch.
    pub fn seek(&mut self, curr: u64) {
        let horizon = curr.saturating_add(self.fall_us);
        let intervals = &self.timeline.intervals;
        self.next = intervals.partition_point(|n| n.start_us <= horizon);
        self.seen = (0..self.next)
            .filter(|&i| !intervals[i].has_ended(curr))
            .collect();
        self.tempo_cursor.reset();
        self.last_time = Some(curr);
    }

    pub fn render(&mut self, index: u64) -> Frame {
        let curr = self.frame_time(index);
        if self.last_time.is_some_and(|last| curr < last) {
            self.seek(curr);
        }
        self.render_at(curr)
    }

    pub fn render_at(&mut self, curr: u64) -> Frame {
        self.last_time = Some(curr);
        self.admit(curr);

        let tempo = *self.tempo_cursor.advance(&self.timeline.tempo, curr);
        let sounding = self.sounding_notes(curr);

        let mut frame = Frame::from_pixel(self.width, self.height, BACKGROUND);
        self.draw_keyboard(&mut frame, &sounding);
        self.draw_bars(&mut frame, curr);
        self.evict(curr);

        if let Some(overlay) = &self.overlay {
            let key = self.timeline.tempo.key_signature().unwrap_or("-");
            let time = self.timeline.tempo.time_signature().unwrap_or("-");
            let lines = [
                format!("Key: {}", key),
                format!("Time: {}", time),
                format!("Tempo: {:.2} BPM", tempo.bpm),
                format!(
                    "{} / {}",
                    format_timestamp(curr),
                    format_timestamp(self.timeline.max_us)
                ),
            ];
            let step = overlay.line_height() as i32;
            for (i, line) in lines.iter().enumerate() {
                let y = TEXT_MARGIN + i as i32 * step;
                overlay.draw(&mut frame, TEXT_MARGIN, y, line, TEXT_COLOR);
            }
        }

        frame
    }

    fn admit(&mut self, curr: u64) {
        let horizon = curr.saturating_add(self.fall_us);
        let intervals = &self.timeline.intervals;
        while self.next < intervals.len() && intervals[self.next].start_us <= horizon {
            let start = intervals[self.next].start_us;
            let pos = self
                .seen
                .partition_point(|&i| intervals[i].start_us <= start);
            self.seen.insert(pos, self.next);
            self.next += 1;
        }
    }

    fn evict(&mut self, curr: u64) {
        let intervals = &self.timeline.intervals;
        self.seen.retain(|&i| !intervals[i].has_ended(curr));
    }

    /// For every pitch, the index of the most recently opened interval that
    /// is sounding at `curr`.
    fn sounding_notes(&self, curr: u64) -> [Option<usize>; 128] {
        let mut sounding = [None; 128];
        for &i in &self.seen {
            let note = &self.timeline.intervals[i];
            if note.is_sounding(curr) {
                sounding[note.pitch as usize & 127] = Some(i);
            }
        }
        sounding
    }

    fn key_color(&self, key: &KeyGeometry, sounding: &[Option<usize>; 128]) -> Rgb<u8> {
        match sounding[key.pitch as usize & 127] {
            Some(i) => {
                let note = &self.timeline.intervals[i];
                shade(self.palette.track(note.track), note.velocity)
            }
            None if key.is_white => self.palette.idle_white(),
            None => self.palette.idle_black(),
        }
    }

    fn draw_keyboard(&self, frame: &mut Frame, sounding: &[Option<usize>; 128]) {
        let top = self.falling_rows();
        let black_bottom = top + (self.keyboard_height as f64 * BLACK_KEY_LENGTH).round() as u32;
        fill_rect(frame, 0, top, self.width, self.height, KEY_BORDER);

        for key in self.keyboard.white_keys() {
            let color = self.key_color(key, sounding);
            fill_inset(frame, key, top + KEY_MARGIN, self.height - KEY_MARGIN, color);
        }
        for key in self.keyboard.black_keys() {
            fill_rect(frame, key.left_px, top, key.right_px, black_bottom, KEY_BORDER);
            let color = self.key_color(key, sounding);
            fill_inset(frame, key, top, black_bottom - KEY_MARGIN, color);
        }
    }

    fn draw_bars(&self, frame: &mut Frame, curr: u64) {
        for &i in &self.seen {
            let note = &self.timeline.intervals[i];
            let Some(key) = self.keyboard.geometry(note.pitch) else {
                continue;
            };
            if let Some((top, bottom)) = self.bar_rows(note, curr) {
                fill_inset(frame, key, top, bottom, self.palette.track(note.track));
            }
        }
    }

    /// Screen row of playback time `t`, which must lie in `curr..=curr + fall`.
    fn row_at(&self, t: u64, curr: u64) -> u32 {
        let rows = self.falling_rows() as u128;
        let offset = (t - curr) as u128;
        let fall = self.fall_us.max(1) as u128;
        let lifted = (offset * rows * 2 + fall) / (fall * 2);
        (rows - lifted.min(rows)) as u32
    }

    /// Rows `[top, bottom)` covered by a note's bar, if any are visible.
    fn bar_rows(&self, note: &NoteInterval, curr: u64) -> Option<(u32, u32)> {
        let horizon = curr.saturating_add(self.fall_us);
        if note.start_us > horizon || note.has_ended(curr) {
            return None;
        }
        let start = note.start_us.clamp(curr, horizon);
        let end = note.end_us.unwrap_or(horizon).clamp(curr, horizon);
        let top = self.row_at(end, curr);
        let bottom = self.row_at(start, curr);
        (top < bottom).then_some((top, bottom))
    }
}

fn fill_inset(frame: &mut Frame, key: &KeyGeometry, top: u32, bottom: u32, color: Rgb<u8>) {
    let left = key.left_px + KEY_MARGIN;
    let right = key.right_px.saturating_sub(KEY_MARGIN);
    if right > left && bottom > top {
        fill_rect(frame, left, top, right, bottom, color);
    }
}
