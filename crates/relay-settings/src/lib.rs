//! # relay-settings
//!
//! Layered configuration for the relay.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.relay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RELAY_*` overrides (highest priority)
//!
//! Command line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, load_with, settings_path};
pub use types::{ColorSettings, LoggingSettings, RelaySettings, ServerSettings};
