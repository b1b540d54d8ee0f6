//! Config file discovery and loading.
//!
//! Resolution order: the explicit path if given, otherwise `config.yaml` in
//! the platform config directory; a missing default file yields the
//! defaults. `WORDCHAIN_DB` overrides the database path afterwards.

use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::config::schema::EngineConfig;
use crate::error::{Error, Result};

const QUALIFIER: &str = "io";
const ORGANIZATION: &str = "wordchain";
const APPLICATION: &str = "wordchain";

const CONFIG_FILE: &str = "config.yaml";
const DATABASE_FILE: &str = "words.db";

/// Environment variable overriding `database.path`.
pub const DB_PATH_ENV: &str = "WORDCHAIN_DB";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .ok_or_else(|| Error::Config("unable to determine project directories".into()))
}

/// Default config file location.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
}

/// Default database location.
pub fn default_database_path() -> Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join(DATABASE_FILE))
}

/// Parse one YAML config file.
pub fn load_config_file(path: &Path) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    if text.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    Ok(serde_yaml::from_str(&text)?)
}

/// Load the effective config.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => match default_config_path() {
            Ok(default) if default.is_file() => load_config_file(&default)?,
            _ => EngineConfig::default(),
        },
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut EngineConfig) {
    if let Some(value) = env::var_os(DB_PATH_ENV).filter(|v| !v.is_empty()) {
        tracing::debug!(path = ?value, "database path from environment");
        config.database.path = Some(PathBuf::from(value));
    }
}

/// The database path the config resolves to.
pub fn resolve_database_path(config: &EngineConfig) -> Result<PathBuf> {
    match &config.database.path {
        Some(path) => Ok(path.clone()),
        None => default_database_path(),
    }
}
