pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod midi;
pub mod render;
pub mod timing;
pub mod video;

pub use config::{Palette, RenderConfig};
pub use engine::{RenderJob, render, run_pipeline};
pub use error::RenderError;
pub use events::{EventKind, RawEvent};
