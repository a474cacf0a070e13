//! Finding and layering config files.
//!
//! Two layers are looked for, the later one winning section by section:
//! the user file `<config dir>/config.toml` and the project file
//! `./cookiegate.toml`. CLI flags are applied on top by the binary.
//!
//! A missing layer is skipped. A layer that fails to parse is skipped with a
//! warning, so a broken user file never blocks a working project file. A
//! file named with `--config` replaces discovery and must load.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{ConfigError, CookiegateConfig, Result};

/// Project-local config file name.
pub const PROJECT_FILE: &str = "cookiegate.toml";

/// File name inside the user config directory.
pub const USER_FILE: &str = "config.toml";

/// Overrides the user config directory when set and non-empty.
pub const CONFIG_DIR_ENV: &str = "COOKIEGATE_CONFIG_DIR";

const APP_DIR: &str = "cookiegate";
const LOG_DIR: &str = "logs";

/// Which layer a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    User,
    Project,
    /// Named on the command line.
    Explicit,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            LayerKind::User => "user",
            LayerKind::Project => "project",
            LayerKind::Explicit => "explicit",
        })
    }
}

/// What happened when a layer was looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    Loaded,
    Missing,
    /// Present but unreadable or not valid config; the message is the cause.
    Invalid(String),
}

/// One config file that was looked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub kind: LayerKind,
    pub path: PathBuf,
    pub status: LayerStatus,
}

impl ConfigLayer {
    pub fn is_loaded(&self) -> bool {
        self.status == LayerStatus::Loaded
    }
}

/// Merged config plus the layers it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CookiegateConfig,
    /// Every layer looked for, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
    /// Skipped layers and risky settings, for the user to see.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of the layers that contributed to `config`.
    pub fn loaded_paths(&self) -> Vec<&Path> {
        self.layers
            .iter()
            .filter(|layer| layer.is_loaded())
            .map(|layer| layer.path.as_path())
            .collect()
    }
}

/// Directories the two discovered layers live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocations {
    /// `None` when no user config directory can be determined.
    pub user_dir: Option<PathBuf>,
    pub project_dir: PathBuf,
}

impl ConfigLocations {
    /// User dir from the environment, project dir is the working directory.
    pub fn from_env() -> Self {
        Self {
            user_dir: user_config_dir(),
            project_dir: PathBuf::from("."),
        }
    }

    fn candidates(&self) -> Vec<(LayerKind, PathBuf)> {
        let user = self
            .user_dir
            .as_ref()
            .map(|dir| (LayerKind::User, dir.join(USER_FILE)));
        let project = (LayerKind::Project, self.project_dir.join(PROJECT_FILE));
        user.into_iter().chain([project]).collect()
    }
}

/// Load and merge every layer found under `locations`.
pub fn discover(locations: &ConfigLocations) -> LoadedConfig {
    let mut config = CookiegateConfig::new();
    let mut warnings = Vec::new();
    let mut layers = Vec::new();

    for (kind, path) in locations.candidates() {
        let status = if !path.is_file() {
            LayerStatus::Missing
        } else {
            match load_file(&path) {
                Ok(layer) => {
                    config.merge(layer);
                    LayerStatus::Loaded
                }
                Err(e) => {
                    warnings.push(format!("skipped {} config {}: {}", kind, path.display(), e));
                    LayerStatus::Invalid(e.to_string())
                }
            }
        };
        layers.push(ConfigLayer { kind, path, status });
    }

    warnings.extend(insecure_tls_warning(&config));
    LoadedConfig {
        config,
        layers,
        warnings,
    }
}

/// Load exactly one file, bypassing discovery. Missing or invalid is an error.
pub fn load_explicit(path: &Path) -> Result<LoadedConfig> {
    let config = load_file(path)?;
    let warnings: Vec<String> = insecure_tls_warning(&config).into_iter().collect();
    Ok(LoadedConfig {
        config,
        layers: vec![ConfigLayer {
            kind: LayerKind::Explicit,
            path: path.to_path_buf(),
            status: LayerStatus::Loaded,
        }],
        warnings,
    })
}

/// Parse one config file.
pub fn load_file(path: &Path) -> Result<CookiegateConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    CookiegateConfig::from_toml(&contents)
}

/// `$COOKIEGATE_CONFIG_DIR`, else the platform config dir + `cookiegate`.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_DIR)),
    }
}

/// Where `[logging] file = true` writes when no `dir` is given.
pub fn default_log_dir() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(LOG_DIR))
}

fn insecure_tls_warning(config: &CookiegateConfig) -> Option<String> {
    config.auth.as_ref().filter(|auth| auth.insecure).map(|_| {
        "[auth] insecure = true: TLS certificates are not verified. \
         Only use this against a trusted development origin."
            .to_string()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
