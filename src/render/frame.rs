use image::{Rgb, RgbImage};

pub type Frame = RgbImage;

/// Fills `[x0, x1) x [y0, y1)`, clipped to the frame.
pub fn fill_rect(frame: &mut Frame, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let x1 = x1.min(frame.width());
    let y1 = y1.min(frame.height());
    for y in y0..y1 {
        for x in x0..x1 {
            frame.put_pixel(x, y, color);
        }
    }
}

/// Mixes `color` over `pixel` with the given coverage in `0.0..=1.0`.
pub fn blend(pixel: &mut Rgb<u8>, color: Rgb<u8>, coverage: f32) {
    let coverage = coverage.clamp(0.0, 1.0);
    for (dst, src) in pixel.0.iter_mut().zip(color.0) {
        *dst = (*dst as f32 * (1.0 - coverage) + src as f32 * coverage).round() as u8;
    }
}

/// Scales a color towards black; full velocity keeps it unchanged.
pub fn shade(color: Rgb<u8>, velocity: u8) -> Rgb<u8> {
    let factor = 0.4 + 0.6 * (velocity.min(127) as f32 / 127.0);
    Rgb(color.0.map(|c| (c as f32 * factor).round() as u8))
}
