//! Package.json loading.
//!
//! The resolver reads main fields from it; manifests carry a picked subset
//! of it for each package in a module's dependency set.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::runtime::{Runtime, RuntimeError};

/// Maximum allowed size for package.json files (10MB)
const MAX_PACKAGE_JSON_SIZE: u64 = 10 * 1024 * 1024;

/// A parsed package.json, kept as raw JSON so any field can be picked.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageJson {
    fields: Map<String, Value>,
    /// File path this was loaded from
    pub path: PathBuf,
}

impl PackageJson {
    /// Load `<dir>/package.json`. A missing file is `Ok(None)`.
    pub async fn load(runtime: &dyn Runtime, dir: &Path) -> Result<Option<Self>> {
        let path = dir.join("package.json");

        let metadata = match runtime.metadata(&path).await {
            Ok(metadata) if metadata.is_file => metadata,
            Ok(_) | Err(RuntimeError::FileNotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if metadata.size > MAX_PACKAGE_JSON_SIZE {
            return Err(Error::PackageJson {
                path,
                reason: format!(
                    "exceeds maximum size of {}MB",
                    MAX_PACKAGE_JSON_SIZE / 1024 / 1024
                ),
            });
        }

        let bytes = runtime.read_file(&path).await?;
        Self::parse(&bytes, path).map(Some)
    }

    pub fn parse(bytes: &[u8], path: PathBuf) -> Result<Self> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(fields)) => Ok(Self { fields, path }),
            Ok(_) => Err(Error::PackageJson {
                path,
                reason: "expected a JSON object".to_string(),
            }),
            Err(e) => Err(Error::PackageJson {
                path,
                reason: e.to_string(),
            }),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Entry file named by the first usable main field.
    ///
    /// A field holding an object (the `browser` field form) maps the plain
    /// `main` through it.
    pub fn main(&self, main_fields: &[String]) -> Option<String> {
        let plain_main = self.fields.get("main").and_then(Value::as_str);
        for field in main_fields {
            match self.fields.get(field) {
                Some(Value::String(main)) => return Some(main.clone()),
                Some(Value::Object(map)) => {
                    let Some(main) = plain_main else { continue };
                    let wanted = normalize(main);
                    if let Some(mapped) = map
                        .iter()
                        .find(|(key, _)| normalize(key) == wanted)
                        .and_then(|(_, value)| value.as_str())
                    {
                        return Some(mapped.to_string());
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// `name`, `version` and `extra` fields, in that order, skipping absent ones.
    pub fn pick(&self, extra: &[String]) -> Map<String, Value> {
        ["name", "version"]
            .into_iter()
            .chain(extra.iter().map(String::as_str))
            .filter_map(|key| self.fields.get(key).map(|v| (key.to_string(), v.clone())))
            .collect()
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(json: &str) -> PackageJson {
        PackageJson::parse(json.as_bytes(), PathBuf::from("package.json")).unwrap()
    }

    #[test]
    fn main_uses_first_string_field() {
        let p = pkg(r#"{ "main": "lib/index.js", "module": "es/index.js" }"#);
        let fields = vec!["module".to_string(), "main".to_string()];
        assert_eq!(p.main(&fields).as_deref(), Some("es/index.js"));
    }

    #[test]
    fn object_field_maps_main() {
        let p = pkg(r#"{ "main": "./lib/node.js", "browser": { "lib/node.js": "./lib/browser.js" } }"#);
        let fields = vec!["browser".to_string(), "main".to_string()];
        assert_eq!(p.main(&fields).as_deref(), Some("./lib/browser.js"));
    }

    #[test]
    fn pick_keeps_requested_fields() {
        let p = pkg(r#"{ "name": "a", "version": "1.0.0", "main": "x.js", "scripts": {} }"#);
        let picked = p.pick(&["main".to_string()]);
        assert_eq!(picked.len(), 3);
        assert!(!picked.contains_key("scripts"));
    }

    #[test]
    fn non_object_is_rejected() {
        let result = PackageJson::parse(b"[]", PathBuf::from("package.json"));
        assert!(matches!(result, Err(Error::PackageJson { .. })));
    }
}
