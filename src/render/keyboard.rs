use crate::error::RenderError;

/// Black key width relative to the nominal white key width.
const BLACK_WIDTH: f64 = 0.58;

pub fn is_white(pitch: u8) -> bool {
    matches!(pitch % 12, 0 | 2 | 4 | 5 | 7 | 9 | 11)
}

/// How far a black key reaches left of the boundary between its two white
/// neighbours, in nominal white widths. The rest of its width lies right.
fn black_reach_left(pitch: u8) -> f64 {
    match pitch % 12 {
        1 => 0.35,
        3 => 0.23,
        6 => 0.37,
        8 => 0.29,
        _ => 0.21,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGeometry {
    pub left_px: u32,
    /// Exclusive.
    pub right_px: u32,
    pub is_white: bool,
    pub pitch: u8,
}

/// Pixel layout of every displayed key, fixed for a whole render.
#[derive(Debug, Clone)]
pub struct Keyboard {
    start: u8,
    keys: Vec<KeyGeometry>,
}

impl Keyboard {
    pub fn new(start: u8, end: u8, width: u32) -> Result<Self, RenderError> {
        if start > end || end > 127 {
            return Err(RenderError::InvalidNoteRange { start, end });
        }
        let total_white = (start..=end).filter(|&p| is_white(p)).count() as u64;
        if total_white == 0 {
            return Err(RenderError::InvalidNoteRange { start, end });
        }
        let total_black = (start..=end).filter(|&p| !is_white(p)).count() as u64;
        if (width as u64) < total_white.max(total_black) {
            return Err(RenderError::InvalidDimensions(format!(
                "{} px cannot fit {} white and {} black keys",
                width, total_white, total_black
            )));
        }

        let nominal = width as f64 / total_white as f64;
        let clamp = |px: f64| px.round().clamp(0.0, width as f64) as u32;

        let mut keys = Vec::with_capacity((end - start) as usize + 1);
        let mut white_index: u64 = 0;
        let mut boundary: u32 = 0;
        let mut black_right: u32 = 0;

        for pitch in start..=end {
            if is_white(pitch) {
                white_index += 1;
                // round(width * i / total_white) in integers
                let right =
                    ((2 * width as u64 * white_index + total_white) / (2 * total_white)) as u32;
                keys.push(KeyGeometry {
                    left_px: boundary,
                    right_px: right,
                    is_white: true,
                    pitch,
                });
                boundary = right;
            } else {
                let reach_left = black_reach_left(pitch);
                let reach_right = BLACK_WIDTH - reach_left;
                let mut left = clamp(boundary as f64 - reach_left * nominal).max(black_right);
                let mut right = clamp(boundary as f64 + reach_right * nominal);
                if right <= left {
                    if left < width {
                        right = left + 1;
                    } else {
                        left = right - 1;
                    }
                }
                keys.push(KeyGeometry {
                    left_px: left,
                    right_px: right,
                    is_white: false,
                    pitch,
                });
                black_right = right;
            }
        }

        // Under two pixels per white key the black keys crowd the right
        // border; push them left until none overlap.
        let mut limit = width;
        for key in keys.iter_mut().rev().filter(|k| !k.is_white) {
            key.right_px = key.right_px.min(limit);
            if key.left_px >= key.right_px {
                key.left_px = key.right_px.saturating_sub(1);
            }
            limit = key.left_px;
        }

        Ok(Self { start, keys })
    }

    pub fn keys(&self) -> &[KeyGeometry] {
        &self.keys
    }

    /// `None` when the pitch is outside the displayed range.
    pub fn geometry(&self, pitch: u8) -> Option<&KeyGeometry> {
        let idx = pitch.checked_sub(self.start)? as usize;
        self.keys.get(idx)
    }

    pub fn white_keys(&self) -> impl Iterator<Item = &KeyGeometry> {
        self.keys.iter().filter(|k| k.is_white)
    }

    pub fn black_keys(&self) -> impl Iterator<Item = &KeyGeometry> {
        self.keys.iter().filter(|k| !k.is_white)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A0: u8 = 21;
    const C8: u8 = 108;

    #[test]
    fn full_piano_has_52_white_keys() {
        let keyboard = Keyboard::new(A0, C8, 1920).unwrap();
        assert_eq!(keyboard.keys().len(), 88);
        assert_eq!(keyboard.white_keys().count(), 52);
        assert_eq!(keyboard.black_keys().count(), 36);
    }

    #[test]
    fn full_piano_bounds_are_ordered_for_any_width() {
        for width in (88..2000).chain([2560, 3840]) {
            let keyboard = Keyboard::new(A0, C8, width).unwrap();

            let whites: Vec<&KeyGeometry> = keyboard.white_keys().collect();
            assert_eq!(whites[0].left_px, 0);
            assert_eq!(whites.last().unwrap().right_px, width);
            for pair in whites.windows(2) {
                assert!(pair[0].left_px < pair[0].right_px);
                assert_eq!(pair[0].right_px, pair[1].left_px, "gap at width {}", width);
            }

            let blacks: Vec<&KeyGeometry> = keyboard.black_keys().collect();
            for pair in blacks.windows(2) {
                assert!(pair[0].left_px < pair[0].right_px);
                assert!(pair[0].right_px <= pair[1].left_px, "overlap at width {}", width);
            }

            for pair in keyboard.keys().windows(2) {
                assert!(pair[0].pitch < pair[1].pitch);
                assert!(pair[0].left_px <= pair[1].left_px);
                assert!(
                    pair[0].left_px + pair[0].right_px <= pair[1].left_px + pair[1].right_px,
                    "keys out of order at width {}",
                    width
                );
            }
        }
    }

    #[test]
    fn white_edges_are_evenly_rounded() {
        let keyboard = Keyboard::new(60, 71, 100).unwrap();
        let edges: Vec<u32> = keyboard.white_keys().map(|k| k.right_px).collect();
        assert_eq!(edges, vec![14, 29, 43, 57, 71, 86, 100]);
    }

    #[test]
    fn black_keys_straddle_the_boundary() {
        let keyboard = Keyboard::new(60, 71, 700).unwrap();
        let c_sharp = keyboard.geometry(61).unwrap();
        assert!(!c_sharp.is_white);
        assert!(c_sharp.left_px < 100 && c_sharp.right_px > 100);
        // C# leans left, D# leans right
        assert_eq!((c_sharp.left_px, c_sharp.right_px), (65, 123));
        let d_sharp = keyboard.geometry(63).unwrap();
        assert_eq!((d_sharp.left_px, d_sharp.right_px), (177, 235));
    }

    #[test]
    fn leading_black_key_is_clamped() {
        let keyboard = Keyboard::new(61, 64, 300).unwrap();
        let first = keyboard.geometry(61).unwrap();
        assert_eq!(first.left_px, 0);
        assert!(first.right_px > 0);
    }

    #[test]
    fn narrow_keyboards_keep_black_keys_apart() {
        for start in 0..=127u8 {
            for end in start..=127u8 {
                let whites = (start..=end).filter(|&p| is_white(p)).count() as u32;
                if whites == 0 {
                    continue;
                }
                for width in whites..=2 * whites + 2 {
                    let Ok(keyboard) = Keyboard::new(start, end, width) else {
                        continue;
                    };
                    let blacks: Vec<&KeyGeometry> = keyboard.black_keys().collect();
                    for key in &blacks {
                        assert!(key.left_px < key.right_px && key.right_px <= width);
                    }
                    for pair in blacks.windows(2) {
                        assert!(
                            pair[0].right_px <= pair[1].left_px,
                            "overlap in {}..={} at width {}",
                            start,
                            end,
                            width
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn trailing_black_keys_shift_left_when_crowded() {
        let keyboard = Keyboard::new(0, 3, 2).unwrap();
        let blacks: Vec<(u32, u32)> = keyboard
            .black_keys()
            .map(|k| (k.left_px, k.right_px))
            .collect();
        assert_eq!(blacks, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn pitches_outside_the_range_have_no_key() {
        let keyboard = Keyboard::new(A0, C8, 1920).unwrap();
        assert!(keyboard.geometry(20).is_none());
        assert!(keyboard.geometry(109).is_none());
        assert_eq!(keyboard.geometry(A0).map(|k| k.pitch), Some(A0));
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(matches!(
            Keyboard::new(80, 70, 100),
            Err(RenderError::InvalidNoteRange { .. })
        ));
        assert!(matches!(
            Keyboard::new(61, 61, 100),
            Err(RenderError::InvalidNoteRange { .. })
        ));
        assert!(matches!(
            Keyboard::new(A0, C8, 40),
            Err(RenderError::InvalidDimensions(_))
        ));
        // C#, D and D# leave one pixel for two black keys
        assert!(matches!(
            Keyboard::new(1, 3, 1),
            Err(RenderError::InvalidDimensions(_))
        ));
    }
}
