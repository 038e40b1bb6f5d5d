mod compositor;
mod frame;
mod keyboard;
mod text;

pub use compositor::Compositor;
pub use frame::{Frame, blend, fill_rect, shade};
pub use keyboard::{KeyGeometry, Keyboard, is_white};
pub use text::{GlyphOverlay, TextOverlay};
