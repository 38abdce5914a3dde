use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use remod_graph::{Pid, ResourceRecord, Runtime, RuntimeError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CacheError, CacheResult};

/// File name of the snapshot inside the output directory.
pub const SNAPSHOT_FILE: &str = ".__resources__.json";

/// Everything needed to resume from a previous install.
///
/// `modules`, `assets` and `cache` are the public shape read by loaders;
/// `members` and `fingerprint` are kept for the next install.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    /// Slug to output slug, for every resource with output.
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
    /// Output slug to the id of the asset holding it.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
    /// Resource records: entry first, then its deep dependency set by index.
    #[serde(default)]
    pub cache: Vec<ResourceRecord>,
    /// Asset id to the pids packed into it, in packing order.
    #[serde(default)]
    pub members: BTreeMap<String, Vec<Pid>>,
    /// Output-shaping settings the snapshot was built with.
    #[serde(default)]
    pub fingerprint: Value,
}

impl Snapshot {
    pub fn new(
        cache: Vec<ResourceRecord>,
        members: BTreeMap<String, Vec<Pid>>,
        fingerprint: Value,
    ) -> Self {
        let mut modules = BTreeMap::new();
        let mut output_slugs: FxHashMap<Pid, &str> = FxHashMap::default();
        for record in &cache {
            if let (Some(slug), Some(output_slug)) = (&record.slug, &record.output_slug) {
                modules.insert(slug.clone(), output_slug.clone());
                output_slugs.insert(record.pid, output_slug.as_str());
            }
        }

        let mut assets = BTreeMap::new();
        for (id, pids) in &members {
            for pid in pids {
                if let Some(output_slug) = output_slugs.get(pid) {
                    assets.insert(output_slug.to_string(), id.clone());
                }
            }
        }

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            modules,
            assets,
            cache,
            members,
            fingerprint,
        }
    }

    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(SNAPSHOT_FILE)
    }

    /// Load the snapshot in `output_dir`.
    ///
    /// A missing or unreadable snapshot, or one written by another version,
    /// is `Ok(None)`: the build simply starts cold.
    pub async fn load(runtime: &dyn Runtime, output_dir: &Path) -> CacheResult<Option<Self>> {
        let path = Self::path(output_dir);
        let bytes = match runtime.read_file(&path).await {
            Ok(bytes) => bytes,
            Err(RuntimeError::FileNotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable snapshot");
                return Ok(None);
            }
        };

        if snapshot.version != env!("CARGO_PKG_VERSION") {
            tracing::debug!(found = %snapshot.version, "discarding snapshot from another version");
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    pub async fn save(&self, runtime: &dyn Runtime, output_dir: &Path) -> CacheResult<()> {
        let json = serde_json::to_vec(self)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        runtime.write_file(&Self::path(output_dir), &json).await?;
        Ok(())
    }

    /// Whether the snapshot was built with the same output-shaping settings.
    pub fn matches(&self, fingerprint: &Value) -> bool {
        &self.fingerprint == fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remod_graph::ResourceKind;
    use remod_graph::test_utils::{TestProject, TestRuntime};
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_through_output_dir() {
        let project = TestProject::new();
        let runtime = TestRuntime::new();
        let out = project.path(".remote");

        let snapshot = Snapshot::new(Vec::new(), BTreeMap::new(), json!({ "strict": false }));
        snapshot.save(&runtime, &out).await.unwrap();

        let loaded = Snapshot::load(&runtime, &out).await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(loaded.matches(&json!({ "strict": false })));
        assert!(!loaded.matches(&json!({ "strict": true })));
    }

    #[test]
    fn public_maps_follow_the_records() {
        let record = |slug: &str, output_slug: &str| ResourceRecord {
            kind: ResourceKind::Normal,
            pid: Pid::of(&format!("./{slug}")),
            module_id: format!("./{slug}"),
            slug: Some(slug.to_string()),
            origin: format!("/project/{slug}"),
            package_id: Some(".".to_string()),
            error: None,
            output_type: Some("js".to_string()),
            output_slug: Some(output_slug.to_string()),
            requests: Vec::new(),
            index: None,
            source_checksum: None,
            options_checksum: None,
            size: 0,
            bundle: None,
            source: None,
            output: None,
        };
        let records = vec![record("src/index.js", "src/index.js"), record("src/data.json", "src/data.json.js")];
        let members = BTreeMap::from([
            ("src/index.js".to_string(), vec![Pid::of("./src/index.js")]),
            ("0123abcd.js".to_string(), vec![Pid::of("./src/data.json")]),
        ]);

        let snapshot = Snapshot::new(records, members, json!({}));
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["modules"]["src/data.json"], "src/data.json.js");
        assert_eq!(value["assets"]["src/data.json.js"], "0123abcd.js");
        assert_eq!(value["assets"]["src/index.js"], "src/index.js");
        assert_eq!(value["cache"][0]["moduleId"], "./src/index.js");
    }

    #[tokio::test]
    async fn missing_or_foreign_snapshots_are_ignored() {
        let project = TestProject::new();
        let runtime = TestRuntime::new();
        let out = project.path(".remote");
        assert!(Snapshot::load(&runtime, &out).await.unwrap().is_none());

        project.write(
            &format!(".remote/{SNAPSHOT_FILE}"),
            r#"{"version":"0.0.0-old","modules":{},"assets":{},"cache":[]}"#,
        );
        assert!(Snapshot::load(&runtime, &out).await.unwrap().is_none());

        project.write(&format!(".remote/{SNAPSHOT_FILE}"), "not json");
        assert!(Snapshot::load(&runtime, &out).await.unwrap().is_none());
    }
}
