//! Configuration system for the cookiegate development proxy.
//!
//! Provides TOML-based configuration with:
//! - `[server]`, `[auth]` and `[logging]` sections, all optional per layer
//! - Config file layering (XDG user config + project-local overrides)
//! - Validation and defaulting into a [`ResolvedConfig`] before the proxy starts

pub mod discovery;
pub mod error;
pub mod resolve;
pub mod types;

pub use discovery::{
    ConfigLayer, ConfigLocations, LayerKind, LayerStatus, LoadedConfig, default_log_dir, discover,
    load_explicit, load_file, user_config_dir,
};
pub use error::{ConfigError, Result};
pub use resolve::{ResolvedConfig, ResolvedLogin};
pub use types::*;
