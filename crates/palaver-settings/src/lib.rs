//! # palaver-settings
//!
//! Layered configuration for the Palaver server.
//!
//! Loading flow:
//! 1. Start with compiled [`PalaverSettings::default()`]
//! 2. If `~/.palaver/settings.json` (or an explicit path) exists, deep-merge it over the defaults
//! 3. Apply `PALAVER_*` environment variable overrides

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{AuthSettings, DatabaseSettings, LoggingSettings, PalaverSettings, ServerSettings};
