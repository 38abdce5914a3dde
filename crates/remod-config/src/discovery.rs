//! File-based config discovery.
//!
//! Finds a scope configuration next to a project root and layers it over the
//! defaults and under `REMOD_` environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized, Toml},
};
use serde_json::Value;

use crate::config::ScopeConfig;
use crate::error::{ConfigError, Result};

/// Name of the dedicated config file.
pub const CONFIG_FILE: &str = "remod.toml";

/// Field of `package.json` holding inline configuration.
pub const PACKAGE_FIELD: &str = "remod";

/// Prefix of environment overrides, e.g. `REMOD_BUNDLE__MAX_SIZE=20000`.
pub const ENV_PREFIX: &str = "REMOD_";

/// File-based configuration discovery
///
/// # Example
///
/// ```no_run
/// use remod_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load_or_default().unwrap();
/// println!("building {}", config.entry);
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config file in the root directory
    ///
    /// Searches in this order:
    /// 1. `remod.toml`
    /// 2. `package.json` with a `remod` field
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join(CONFIG_FILE);
        if toml_path.is_file() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join("package.json");
        read_package_field(&pkg_path).ok().flatten().map(|_| pkg_path)
    }

    /// Load config from the discovered file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<ScopeConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        self.extract(Some(path))
    }

    /// Load config from the discovered file, falling back to defaults plus
    /// environment overrides when there is none.
    pub fn load_or_default(&self) -> Result<ScopeConfig> {
        self.extract(self.find())
    }

    /// The layered figment for `path`, exposed for callers that merge
    /// further providers (e.g. command-line flags) on top.
    pub fn figment(&self, path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(ScopeConfig::default()));

        if let Some(path) = path {
            if path.file_name() == Some(std::ffi::OsStr::new("package.json")) {
                let value = read_package_field(path)?.ok_or_else(|| ConfigError::InvalidValue {
                    field: PACKAGE_FIELD.to_string(),
                    hint: format!("add a '{PACKAGE_FIELD}' field to {}", path.display()),
                })?;
                figment = figment.merge(Json::string(&value.to_string()));
            } else {
                let content = fs::read_to_string(path)?;
                toml::from_str::<toml::Value>(&content).map_err(|e| ConfigError::InvalidValue {
                    field: "toml".to_string(),
                    hint: format!("Invalid TOML syntax in {}: {e}", path.display()),
                })?;
                figment = figment.merge(Toml::string(&content));
            }
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn extract(&self, path: Option<PathBuf>) -> Result<ScopeConfig> {
        let mut config: ScopeConfig = self.figment(path.as_deref())?.extract()?;
        match &path {
            Some(path) => tracing::debug!(path = %path.display(), "loaded scope config"),
            None => tracing::debug!(root = %self.root.display(), "no scope config, using defaults"),
        }
        config.source = path;
        config.validate()?;
        Ok(config)
    }
}

fn read_package_field(path: &Path) -> Result<Option<Value>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
        field: "package.json".to_string(),
        hint: format!("Invalid JSON: {e}"),
    })?;
    Ok(parsed.get(PACKAGE_FIELD).filter(|v| !v.is_null()).cloned())
}

/// Discover and load config from the current directory.
pub fn discover() -> Result<ScopeConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_when_no_config() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn find_prefers_toml_over_package_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "entry = \"./a.js\"\n").unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "remod": { "entry": "./b.js" } }"#,
        )
        .unwrap();

        let found = ConfigDiscovery::new(dir.path()).find().unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE));
    }

    #[test]
    fn package_json_without_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{ "name": "app" }"#).unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn load_returns_not_found_when_no_config() {
        let dir = TempDir::new().unwrap();
        let result = ConfigDiscovery::new(dir.path()).load();
        assert!(matches!(result, Err(ConfigError::NotFound)));
    }

    #[test]
    fn invalid_toml_names_the_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "entry = \"./a.js\n").unwrap();

        let err = ConfigDiscovery::new(dir.path()).load().unwrap_err();
        match err {
            ConfigError::InvalidValue { field, hint } => {
                assert_eq!(field, "toml");
                assert!(hint.contains(CONFIG_FILE));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
