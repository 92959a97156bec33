//! # waypoint-settings
//!
//! Layered configuration for the Waypoint relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WaypointSettings::default()`]
//! 2. **Settings file**: `~/.waypoint/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WAYPOINT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::*;
