//! # nerv-settings
//!
//! Layered configuration for the nerv pipeline.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`NervSettings::default()`]
//! 2. **Settings file**: `$NERV_SETTINGS`, else `~/.nerv/settings.json`,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `NERV_*` overrides (highest priority)
//!
//! ```no_run
//! use nerv_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("model: {}", settings.llm.model);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
