mod config;
pub mod database;
pub mod memory;
mod migrations;
mod records;
mod traits;

pub use config::{Config, DiscordConfig, FocusConfig, ReportConfig};
pub use database::Database;
pub use memory::MemoryStore;
pub use records::{CompletedSessionRecord, UserProgressionRecord};
pub use traits::{ReportArchive, SessionLog, UserStore};

use std::path::PathBuf;

/// Returns `~/.config/ascend[-dev]/` based on ASCEND_ENV.
///
/// Set ASCEND_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("ASCEND_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("ascend-dev")
    } else {
        base_dir.join("ascend")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
