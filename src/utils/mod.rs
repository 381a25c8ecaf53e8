//! Utility functions

mod time;
pub mod volume;

pub use time::format_duration;
pub use volume::{log_volume, real_volume, VOLUME_BASE};
