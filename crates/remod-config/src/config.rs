//! The top-level [`ScopeConfig`] structure.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ConfigError, Result};
use crate::settings::{BundleSettings, LogSettings, ResolveSettings, UnionSettings, WatchSettings};

/// Configuration of one build scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Project root. Relative paths are taken from the config file's directory.
    pub root: PathBuf,

    /// Entry request, resolved from the root.
    pub entry: String,

    /// Output directory, relative to the root.
    pub output: PathBuf,

    /// Fail the build on unresolvable requests instead of producing Null resources.
    pub strict: bool,

    /// Run each pipeline's compression step on generated output.
    pub compress: bool,

    /// URL path the runtime loader serves resources under. `href` requests
    /// are rewritten to URLs below it.
    pub public_path: String,

    /// Modules provided by the runtime. `None` uses the resolver's builtin list.
    pub core: Option<Vec<String>>,

    pub resolve: ResolveSettings,

    pub bundle: BundleSettings,

    /// Named bundles grouping resources by slug prefix.
    pub unions: Vec<UnionSettings>,

    pub watch: WatchSettings,

    /// Request rewrites, applied by prefix (`react` also covers `react/jsx-runtime`).
    pub alias: IndexMap<String, String>,

    /// Requests delegated to the runtime loader. `/.../` entries are regexes.
    pub external: Vec<String>,

    /// Requests replaced by nothing. `/.../` entries are regexes.
    pub null: Vec<String>,

    pub log: LogSettings,

    /// File this configuration was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            entry: ".".to_string(),
            output: PathBuf::from(".remote"),
            strict: false,
            compress: false,
            public_path: "/".to_string(),
            core: None,
            resolve: ResolveSettings::default(),
            bundle: BundleSettings::default(),
            unions: Vec::new(),
            watch: WatchSettings::default(),
            alias: IndexMap::new(),
            external: Vec::new(),
            null: Vec::new(),
            log: LogSettings::default(),
            source: None,
        }
    }
}

impl ScopeConfig {
    /// Create a config for `entry` rooted at `root`, everything else defaulted.
    pub fn new(root: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            entry: entry.into(),
            ..Self::default()
        }
    }

    /// Create from serde_json::Value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use remod_config::ScopeConfig;
    /// use serde_json::json;
    ///
    /// let config = ScopeConfig::from_value(json!({
    ///     "entry": "./src/index.js",
    ///     "bundle": { "max_size": 20000 }
    /// }))
    /// .unwrap();
    /// assert_eq!(config.bundle.max_size, 20_000);
    /// assert_eq!(config.bundle.min_size, 50_000);
    /// ```
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: e.to_string(),
        })
    }

    /// Builder-style setter for the output directory.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /// Builder-style setter for strict resolution.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Builder-style setter for packing thresholds.
    pub fn with_bundle_sizes(mut self, min_size: u64, max_size: u64) -> Self {
        self.bundle = BundleSettings { min_size, max_size };
        self
    }

    /// Check values that deserialize fine but cannot drive a build.
    pub fn validate(&self) -> Result<()> {
        if self.entry.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "entry".to_string(),
                hint: "entry must not be empty".to_string(),
            });
        }

        if self.bundle.max_size == 0 || self.bundle.min_size > self.bundle.max_size {
            return Err(ConfigError::InvalidValue {
                field: "bundle".to_string(),
                hint: format!(
                    "min_size ({}) must not exceed a non-zero max_size ({})",
                    self.bundle.min_size, self.bundle.max_size
                ),
            });
        }

        if let Some(ext) = self.resolve.extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(ConfigError::InvalidValue {
                field: "resolve.extensions".to_string(),
                hint: format!("extension '{ext}' must start with '.'"),
            });
        }

        if !self.public_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "public_path".to_string(),
                hint: format!("public path '{}' must start with '/'", self.public_path),
            });
        }

        if self.output.is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "output".to_string(),
                hint: "output must be relative to the root".to_string(),
            });
        }

        Ok(())
    }

    /// Absolute, canonical root directory.
    ///
    /// A relative root is taken from the directory of [`ScopeConfig::source`],
    /// or from `base` when the config did not come from a file.
    pub fn root_dir(&self, base: &Path) -> Result<PathBuf> {
        let anchor = self
            .source
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(base);
        let root = if self.root.is_absolute() {
            self.root.clone()
        } else {
            anchor.join(&self.root)
        };
        root.canonicalize()
            .map_err(|_| ConfigError::RootNotFound(root.clone()))
    }

    /// Settings that change generated output. Hashed into every resource's
    /// options checksum, so editing any of them reprocesses the whole scope.
    pub fn fingerprint(&self) -> Value {
        json!({
            "strict": self.strict,
            "compress": self.compress,
            "public_path": self.public_path,
            "core": self.core,
            "resolve": self.resolve,
            "alias": self.alias,
            "external": self.external,
            "null": self.null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_defaults() {
        ScopeConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_inverted_sizes() {
        let config = ScopeConfig::default().with_bundle_sizes(200, 100);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "bundle"
        ));
    }

    #[test]
    fn validate_rejects_empty_entry() {
        let config = ScopeConfig::new(".", "  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bare_extension() {
        let mut config = ScopeConfig::default();
        config.resolve.extensions.push("ts".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_public_path() {
        let mut config = ScopeConfig::default();
        config.public_path = "assets/".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "public_path"
        ));
    }

    #[test]
    fn fingerprint_ignores_watch_and_log() {
        let a = ScopeConfig::default();
        let mut b = ScopeConfig::default();
        b.watch.debounce_ms = 5;
        b.log.level = "debug".to_string();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.alias.insert("react".to_string(), "preact/compat".to_string());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn root_dir_is_anchored_at_source() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("app")).unwrap();
        let mut config = ScopeConfig::new("app", "./index.js");
        config.source = Some(dir.path().join("remod.toml"));

        let root = config.root_dir(Path::new("/nonexistent")).unwrap();
        assert_eq!(root, dir.path().join("app").canonicalize().unwrap());
    }

    #[test]
    fn root_dir_reports_missing_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ScopeConfig::new("missing", ".");
        assert!(matches!(
            config.root_dir(dir.path()),
            Err(ConfigError::RootNotFound(_))
        ));
    }
}
