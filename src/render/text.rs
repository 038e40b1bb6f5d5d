use std::fs;
use std::path::Path;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};
use image::Rgb;

use super::frame::{Frame, blend};
use crate::error::RenderError;

/// Draws overlay text onto frames.
pub trait TextOverlay: Send {
    /// `(x, y)` is the top-left corner of the line.
    fn draw(&self, frame: &mut Frame, x: i32, y: i32, text: &str, color: Rgb<u8>);

    fn line_height(&self) -> u32;
}

/// Overlay backed by a TrueType/OpenType font file.
pub struct GlyphOverlay {
    font: FontVec,
    scale: PxScale,
}

impl GlyphOverlay {
    pub fn load(path: &Path, size: f32) -> Result<Self, RenderError> {
        let bytes = fs::read(path).map_err(|e| RenderError::io(path, e))?;
        let font = FontVec::try_from_vec(bytes).map_err(|_| RenderError::Font {
            path: path.to_path_buf(),
        })?;
        Ok(Self {
            font,
            scale: PxScale::from(size),
        })
    }
}

impl TextOverlay for GlyphOverlay {
    fn draw(&self, frame: &mut Frame, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        let scaled = self.font.as_scaled(self.scale);
        let baseline = y as f32 + scaled.ascent();
        let mut caret = x as f32;
        let (width, height) = frame.dimensions();

        for c in text.chars() {
            let id = scaled.glyph_id(c);
            let glyph = id.with_scale_and_position(self.scale, point(caret, baseline));
            caret += scaled.h_advance(id);

            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                    blend(frame.get_pixel_mut(px as u32, py as u32), color, coverage);
                }
            });
        }
    }

    fn line_height(&self) -> u32 {
        self.font.as_scaled(self.scale).height().ceil() as u32
    }
}
