//! Manifests: what the runtime loader needs to fetch a module and its
//! synchronous dependencies.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use crate::ids::Pid;
use crate::resource::Resource;

/// Descriptor of one module in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub module_id: String,
    pub pid: Pid,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
}

impl ManifestEntry {
    pub fn of(resource: &Resource, asset_id: Option<String>) -> Self {
        Self {
            module_id: resource.module_id.clone(),
            pid: resource.pid,
            output_type: resource.output_type.clone(),
            output_slug: resource.output_slug.clone(),
            asset_id,
            package_id: resource.package_id.clone(),
        }
    }
}

/// Manifest lookup key.
#[derive(Debug, Clone, Copy)]
pub enum ManifestKey<'a> {
    Pid(Pid),
    ModuleId(&'a str),
}

impl From<Pid> for ManifestKey<'_> {
    fn from(pid: Pid) -> Self {
        ManifestKey::Pid(pid)
    }
}

impl<'a> From<&'a str> for ManifestKey<'a> {
    fn from(module_id: &'a str) -> Self {
        ManifestKey::ModuleId(module_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    meta: ManifestEntry,
    dependencies: Vec<ManifestEntry>,
    #[serde(default)]
    exclusions: Vec<Pid>,
    #[serde(default)]
    packages: BTreeMap<String, Value>,
    #[serde(skip)]
    by_pid: FxHashMap<Pid, usize>,
    #[serde(skip)]
    by_module_id: FxHashMap<String, usize>,
}

impl Manifest {
    pub fn new(meta: ManifestEntry, dependencies: Vec<ManifestEntry>, exclusions: Vec<Pid>) -> Self {
        let mut manifest = Self {
            meta,
            dependencies,
            exclusions,
            packages: BTreeMap::new(),
            by_pid: FxHashMap::default(),
            by_module_id: FxHashMap::default(),
        };
        manifest.build_lookup();
        manifest
    }

    /// Default dependency filter: same output type as the manifest's module.
    pub fn same_type(meta: &ManifestEntry, entry: &ManifestEntry) -> bool {
        meta.output_type == entry.output_type
    }

    /// Build the manifest of `pid` from its loaded graph.
    ///
    /// Dependencies are the synchronous deep set of Normal resources, most
    /// deeply nested first. Entries rejected by `filter` are listed as
    /// exclusions.
    pub fn build<A, F>(graph: &ResourceGraph, pid: Pid, asset_of: A, filter: F) -> Result<Self>
    where
        A: Fn(&Resource) -> Option<String>,
        F: Fn(&ManifestEntry, &ManifestEntry) -> bool,
    {
        let meta = graph
            .with(pid, |r| ManifestEntry::of(r, asset_of(r)))
            .ok_or(Error::UnknownResource(pid))?;
        let deep = graph.deep_dependency_set(
            pid,
            |edge, child| !edge.is_async && child.is_normal(),
            true,
        )?;

        let mut resolved: Vec<(Option<_>, ManifestEntry)> = deep
            .into_iter()
            .filter_map(|dep| graph.with(dep, |r| (r.index.clone(), ManifestEntry::of(r, asset_of(r)))))
            .collect();
        resolved.sort_by(|(a, _), (b, _)| b.cmp(a));

        let mut dependencies = Vec::with_capacity(resolved.len());
        let mut exclusions = Vec::new();
        for (_, entry) in resolved {
            if filter(&meta, &entry) {
                dependencies.push(entry);
            } else {
                exclusions.push(entry.pid);
            }
        }
        Ok(Self::new(meta, dependencies, exclusions))
    }

    /// Attach `package.json` excerpts keyed by package id.
    pub fn with_packages(mut self, packages: BTreeMap<String, Value>) -> Self {
        self.packages = packages;
        self
    }

    fn build_lookup(&mut self) {
        self.by_pid.clear();
        self.by_module_id.clear();
        for (i, entry) in self.dependencies.iter().enumerate() {
            self.by_pid.insert(entry.pid, i);
            self.by_module_id.insert(entry.module_id.clone(), i);
        }
    }

    pub fn lookup<'a>(&self, key: impl Into<ManifestKey<'a>>) -> Option<&ManifestEntry> {
        let key = key.into();
        let matches_meta = match key {
            ManifestKey::Pid(pid) => pid == self.meta.pid,
            ManifestKey::ModuleId(id) => id == self.meta.module_id,
        };
        if matches_meta {
            return Some(&self.meta);
        }
        let index = match key {
            ManifestKey::Pid(pid) => self.by_pid.get(&pid),
            ManifestKey::ModuleId(id) => self.by_module_id.get(id),
        };
        index.and_then(|i| self.dependencies.get(*i))
    }

    pub fn exists<'a>(&self, key: impl Into<ManifestKey<'a>>) -> bool {
        self.lookup(key).is_some()
    }

    pub fn excluded(&self, pid: Pid) -> bool {
        self.exclusions.contains(&pid)
    }

    pub fn meta(&self) -> &ManifestEntry {
        &self.meta
    }

    pub fn dependencies(&self) -> &[ManifestEntry] {
        &self.dependencies
    }

    pub fn exclusions(&self) -> &[Pid] {
        &self.exclusions
    }

    /// Module ids of every dependency, in load order.
    pub fn list(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .map(|entry| entry.module_id.as_str())
            .collect()
    }

    pub fn package(&self, package_id: &str) -> Option<&Value> {
        self.packages.get(package_id)
    }

    pub fn packages(&self) -> &BTreeMap<String, Value> {
        &self.packages
    }

    /// Package ids of the module and its dependencies.
    pub fn package_ids(&self) -> FxHashSet<&str> {
        std::iter::once(&self.meta)
            .chain(&self.dependencies)
            .filter_map(|entry| entry.package_id.as_deref())
            .collect()
    }

    /// Asset ids to fetch, dependencies first, each once.
    pub fn assets(&self) -> Vec<&str> {
        let assets: IndexSet<&str> = self
            .dependencies
            .iter()
            .chain(std::iter::once(&self.meta))
            .filter_map(|entry| entry.asset_id.as_deref())
            .collect();
        assets.into_iter().collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn load(json: &str) -> Result<Self> {
        let mut manifest: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        manifest.build_lookup();
        Ok(manifest)
    }
}

impl PartialEq for Manifest {
    fn eq(&self, other: &Self) -> bool {
        self.meta == other.meta
            && self.dependencies == other.dependencies
            && self.exclusions == other.exclusions
            && self.packages == other.packages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(module_id: &str, ty: &str, asset: &str) -> ManifestEntry {
        ManifestEntry {
            module_id: module_id.to_string(),
            pid: Pid::of(module_id),
            output_type: Some(ty.to_string()),
            output_slug: None,
            asset_id: Some(asset.to_string()),
            package_id: Some(".".to_string()),
        }
    }

    #[test]
    fn lookup_by_pid_and_module_id() {
        let manifest = Manifest::new(
            entry("./index.js", "js", "a.js"),
            vec![entry("./b.js", "js", "b.js")],
            vec![Pid::of("./style.css")],
        );
        assert!(manifest.exists("./index.js"));
        assert!(manifest.exists(Pid::of("./b.js")));
        assert_eq!(
            manifest.lookup("./b.js").map(|e| e.pid),
            Some(Pid::of("./b.js"))
        );
        assert!(manifest.excluded(Pid::of("./style.css")));
        assert_eq!(manifest.list(), vec!["./b.js"]);
    }

    #[test]
    fn assets_are_unique_and_dependencies_come_first() {
        let manifest = Manifest::new(
            entry("./index.js", "js", "main.js"),
            vec![
                entry("./a.js", "js", "shared.js"),
                entry("./b.js", "js", "shared.js"),
            ],
            vec![],
        );
        assert_eq!(manifest.assets(), vec!["shared.js", "main.js"]);
    }

    #[test]
    fn json_keeps_lookup() {
        let manifest = Manifest::new(
            entry("./index.js", "js", "main.js"),
            vec![entry("./a.js", "js", "a.js")],
            vec![],
        )
        .with_packages(BTreeMap::from([(
            ".".to_string(),
            serde_json::json!({ "name": "app" }),
        )]));
        let json = manifest.to_json().unwrap();
        assert!(json.contains("\"type\": \"js\""));
        let loaded = Manifest::load(&json).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.exists("./a.js"));
        assert_eq!(loaded.package(".").unwrap()["name"], "app");
    }
}
