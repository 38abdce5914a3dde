//! Nested settings tables of a scope configuration.

use serde::{Deserialize, Serialize};

/// Module resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveSettings {
    /// Extensions tried, in order, when a request names no file directly.
    pub extensions: Vec<String>,
    /// `package.json` fields consulted for a package's entry file.
    pub main_fields: Vec<String>,
    /// Directory names searched for bare (package) requests.
    pub module_dirs: Vec<String>,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            extensions: [".js", ".jsx", ".mjs", ".es", ".es6", ".json"]
                .into_iter()
                .map(String::from)
                .collect(),
            main_fields: vec!["main".to_string()],
            module_dirs: vec!["node_modules".to_string()],
        }
    }
}

/// Asset packing thresholds, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleSettings {
    pub min_size: u64,
    pub max_size: u64,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            min_size: 50_000,
            max_size: 100_000,
        }
    }
}

/// Groups resources whose slug starts with one of `include` into one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionSettings {
    pub id: String,
    #[serde(default)]
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Window over which filesystem events are coalesced.
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
