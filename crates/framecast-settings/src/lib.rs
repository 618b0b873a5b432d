//! # framecast-settings
//!
//! Layered configuration for the framecast server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`FramecastSettings::default()`], built from
//!    `framecast_core::constants`
//! 2. **User file**: `~/.framecast/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `FRAMECAST_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings, load_settings_from_path, read_settings_file,
    settings_path, settings_path_from,
};
pub use types::*;
