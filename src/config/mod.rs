//! Client configuration and persisted session memory

mod memory;
mod settings;

pub use memory::{MemoryData, SessionMemory};
pub use settings::ClientConfig;

use anyhow::Result;
use std::path::PathBuf;

/// ~/.config/tunemirror
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join("tunemirror"))
}
