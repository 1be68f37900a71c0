//! # gqlws-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GqlwsSettings::default()`]
//! 2. **Settings file**: `~/.gqlws/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `GQLWS_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = GqlwsSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = GqlwsSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.server.path, "/graphql");
        assert_eq!(settings.protocol.connection_init_wait_timeout_ms, 3_000);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }
}
