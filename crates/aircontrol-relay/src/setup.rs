//! Config and catalog loading.

use std::path::{Path, PathBuf};

use aircontrol_types::MAX_PLAYERS;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::RelayError;

/// Read `config.toml` from `path`, or from [`config_dir`] when no path is
/// given.
///
/// Only the default location may be absent. A relative `catalog.path` is
/// taken relative to the config file.
pub fn load_config(path: Option<&Path>) -> Result<Config, RelayError> {
    let (config_path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    if !config_path.is_file() {
        if explicit {
            return Err(RelayError::Config(format!(
                "config file {} does not exist",
                config_path.display()
            )));
        }
        info!(path = %config_path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| RelayError::Config(format!("{}: {e}", config_path.display())))?;
    let mut config: Config = toml::from_str(&content)
        .map_err(|e| RelayError::Config(format!("{}: {e}", config_path.display())))?;
    validate(&config)?;

    if let (Some(catalog), Some(dir)) = (config.catalog.path.as_mut(), config_path.parent()) {
        if Path::new(catalog.as_str()).is_relative() {
            *catalog = dir.join(catalog.as_str()).to_string_lossy().into_owned();
        }
    }

    info!(
        path = %config_path.display(),
        catalog = config.catalog.path.as_deref().unwrap_or("built-in"),
        "loaded config"
    );
    Ok(config)
}

fn validate(config: &Config) -> Result<(), RelayError> {
    if !(1..=MAX_PLAYERS).contains(&config.relay.max_players) {
        return Err(RelayError::Config(format!(
            "relay.max_players must be between 1 and {MAX_PLAYERS}, got {}",
            config.relay.max_players
        )));
    }
    if config.direct.max_controllers == 0 {
        return Err(RelayError::Config(
            "direct.max_controllers must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Load and sanitise a JSON profile catalog.
///
/// A missing path gives the built-in catalog. An unreadable or malformed
/// file is logged and also gives the built-in catalog.
pub fn load_catalog(path: Option<&Path>) -> Catalog {
    let Some(path) = path else {
        info!("no catalog configured, using built-in profiles");
        return Catalog::builtin();
    };

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("failed to read catalog: {e}")))
        .and_then(|raw| Catalog::from_json_str(&raw).map_err(RelayError::from));

    match parsed {
        Ok(catalog) => {
            info!(
                path = %path.display(),
                profiles = catalog.profiles().len(),
                layouts = catalog.layouts().len(),
                "loaded catalog"
            );
            catalog
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "falling back to built-in catalog");
            Catalog::builtin()
        }
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("aircontrol")
}

/// Get the default config file path.
fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
