//! Snapshot records for ResourceGraph.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::ResourceGraph;
use crate::error::{Error, Result};
use crate::ids::Pid;
use crate::index::ResourceIndex;
use crate::resource::{RequestEdge, Resource, ResourceKind};

/// A recorded request of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub value: String,
    #[serde(default)]
    pub is_async: bool,
    pub pid: Pid,
}

/// Persisted form of a [`Resource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub pid: Pid,
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_slug: Option<String>,
    #[serde(default)]
    pub requests: Vec<RequestRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<ResourceIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_checksum: Option<String>,
    #[serde(default)]
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl From<&Resource> for ResourceRecord {
    fn from(resource: &Resource) -> Self {
        Self {
            kind: resource.kind,
            pid: resource.pid,
            module_id: resource.module_id.clone(),
            slug: resource.slug.clone(),
            origin: resource.origin.clone(),
            package_id: resource.package_id.clone(),
            error: resource.error.clone(),
            output_type: resource.output_type.clone(),
            output_slug: resource.output_slug.clone(),
            requests: resource
                .requests
                .iter()
                .map(|(value, edge)| RequestRecord {
                    value: value.clone(),
                    is_async: edge.is_async,
                    pid: edge.pid,
                })
                .collect(),
            index: resource.index.clone(),
            source_checksum: resource.source_checksum.clone(),
            options_checksum: resource.options_checksum.clone(),
            size: resource.size,
            bundle: resource.bundle.clone(),
            source: resource.source.as_deref().map(str::to_string),
            // Binary output is not kept; the resource rebuilds on hydration.
            output: resource
                .output
                .as_deref()
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .map(str::to_string),
        }
    }
}

impl ResourceRecord {
    /// Rebuild a resource. Edges are left empty for the caller to restore.
    pub fn into_resource(self, keep_index: bool) -> Resource {
        let normal = self.kind == ResourceKind::Normal;
        Resource {
            kind: self.kind,
            pid: self.pid,
            module_id: self.module_id,
            slug: self.slug,
            origin: self.origin,
            package_id: self.package_id,
            error: self.error,
            output_type: self.output_type,
            output_slug: self.output_slug,
            requests: self
                .requests
                .into_iter()
                .map(|r| {
                    (
                        r.value,
                        RequestEdge {
                            pid: r.pid,
                            is_async: r.is_async,
                        },
                    )
                })
                .collect::<IndexMap<_, _>>(),
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            index: if keep_index { self.index } else { None },
            source_checksum: self.source_checksum,
            options_checksum: self.options_checksum,
            dirty: normal && self.output.is_none(),
            loaded: !normal,
            size: self.size,
            bundle: self.bundle,
            source: self.source.map(Arc::from),
            output: self.output.map(|o| Arc::from(o.into_bytes())),
        }
    }
}

impl ResourceGraph {
    /// `entry` followed by its deep dependency set, ordered by index.
    pub fn export(&self, entry: Pid) -> Result<Vec<ResourceRecord>> {
        let mut pids = vec![entry];
        pids.extend(self.deep_dependency_set(entry, |_, _| true, false)?);

        let inner = self.inner.read();
        let mut records: Vec<ResourceRecord> = pids
            .iter()
            .filter_map(|pid| inner.resources.get(pid))
            .map(ResourceRecord::from)
            .collect();
        records.sort_by(|a, b| match (&a.index, &b.index) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(records)
    }

    /// Export as pretty JSON.
    pub fn to_json(&self, entry: Pid) -> Result<String> {
        let records = self.export(entry)?;
        serde_json::to_string_pretty(&records).map_err(|e| Error::Serialization(e.to_string()))
    }
}
