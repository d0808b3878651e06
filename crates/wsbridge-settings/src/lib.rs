//! # wsbridge-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WsBridgeSettings::default()`]
//! 2. **User file**: `~/.wsbridge/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WSBRIDGE_*` overrides (highest priority)
//!
//! Settings are loaded once by the binary and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{ClientSettings, EndpointSettings, LinkSettings, ReconnectSettings, WsBridgeSettings};
