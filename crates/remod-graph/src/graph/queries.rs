//! Query methods for ResourceGraph.

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;

use super::{GraphInner, ResourceGraph};
use crate::error::{Error, Result};
use crate::ids::Pid;
use crate::resource::{RequestEdge, RequestTarget, Resource};

impl ResourceGraph {
    pub fn get(&self, pid: Pid) -> Option<Resource> {
        self.inner.read().resources.get(&pid).cloned()
    }

    /// Borrow a resource under the read lock.
    pub fn with<R>(&self, pid: Pid, f: impl FnOnce(&Resource) -> R) -> Option<R> {
        self.inner.read().resources.get(&pid).map(f)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.inner.read().resources.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.inner.read().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().resources.is_empty()
    }

    pub fn entry(&self) -> Option<Pid> {
        self.inner.read().entry
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.inner.read().resources.keys().copied().collect()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.inner.read().resources.values().cloned().collect()
    }

    /// Pid of `module_id` if such a resource exists.
    pub fn pid_of(&self, module_id: &str) -> Option<Pid> {
        let pid = Pid::of(module_id);
        self.contains(pid).then_some(pid)
    }

    /// Transitive dependencies of `pid` in request order.
    ///
    /// A resource reached again moves to the end but is expanded only once.
    /// `pid` itself is excluded. Only
    /// edges accepted by `filter` are followed. With `require_loaded`, an
    /// unloaded resource in the set is an error.
    pub fn deep_dependency_set<F>(&self, pid: Pid, filter: F, require_loaded: bool) -> Result<Vec<Pid>>
    where
        F: Fn(&RequestEdge, &Resource) -> bool,
    {
        let inner = self.inner.read();
        if !inner.resources.contains_key(&pid) {
            return Err(Error::UnknownResource(pid));
        }
        let mut set = IndexSet::new();
        let mut expanded = FxHashSet::default();
        inner.collect_deep(pid, &filter, &mut set, &mut expanded);
        set.shift_remove(&pid);

        if require_loaded {
            let unloaded = set
                .iter()
                .filter_map(|dep| inner.resources.get(dep))
                .find(|resource| !resource.loaded);
            if let Some(resource) = unloaded {
                return Err(Error::NotLoaded(resource.module_id.clone()));
            }
        }
        Ok(set.into_iter().collect())
    }

    /// Whether `pid` is reachable from `ancestor`.
    pub fn dependency_of(&self, pid: Pid, ancestor: Pid) -> bool {
        let inner = self.inner.read();
        let mut visited = FxHashSet::default();
        let mut stack: Vec<Pid> = inner
            .resources
            .get(&ancestor)
            .map(|r| r.dependencies.iter().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            if current == pid {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(resource) = inner.resources.get(&current) {
                stack.extend(resource.dependencies.iter().copied());
            }
        }
        false
    }

    /// Raw request to generated-output target for every request of `pid`.
    pub fn request_map(&self, pid: Pid) -> Result<IndexMap<String, RequestTarget>> {
        let inner = self.inner.read();
        let resource = inner
            .resources
            .get(&pid)
            .ok_or(Error::UnknownResource(pid))?;
        Ok(resource
            .requests
            .iter()
            .map(|(value, edge)| {
                let target = inner
                    .resources
                    .get(&edge.pid)
                    .map_or(RequestTarget::Null, Resource::as_target);
                (value.clone(), target)
            })
            .collect())
    }

    /// Source files of every Normal resource reachable from `entry`,
    /// `entry` included.
    pub fn origins(&self, entry: Pid) -> Vec<PathBuf> {
        let inner = self.inner.read();
        let mut visited = FxHashSet::default();
        let mut stack = vec![entry];
        let mut origins = Vec::new();
        while let Some(pid) = stack.pop() {
            if !visited.insert(pid) {
                continue;
            }
            let Some(resource) = inner.resources.get(&pid) else {
                continue;
            };
            if let Some(path) = resource.path() {
                origins.push(path.to_path_buf());
            }
            stack.extend(resource.dependencies.iter().copied());
        }
        origins.sort();
        origins
    }

    /// Normal resources whose source file is `path`.
    pub fn find_by_origin(&self, path: &Path) -> Vec<Pid> {
        self.inner
            .read()
            .resources
            .values()
            .filter(|r| r.path() == Some(path))
            .map(|r| r.pid)
            .collect()
    }

    /// Null resources left by a failed resolution, with their dependents.
    /// Requests nulled by middleware never resolve and are not listed.
    pub fn unresolved(&self) -> Vec<(Pid, Vec<Pid>)> {
        self.inner
            .read()
            .resources
            .values()
            .filter(|r| r.is_null() && r.error.is_some())
            .map(|r| (r.pid, r.dependents.iter().copied().collect()))
            .collect()
    }
}

impl GraphInner {
    fn collect_deep<F>(
        &self,
        pid: Pid,
        filter: &F,
        set: &mut IndexSet<Pid>,
        expanded: &mut FxHashSet<Pid>,
    ) where
        F: Fn(&RequestEdge, &Resource) -> bool,
    {
        if !expanded.insert(pid) {
            return;
        }
        let Some(resource) = self.resources.get(&pid) else {
            return;
        };
        for edge in resource.requests.values() {
            let Some(child) = self.resources.get(&edge.pid) else {
                continue;
            };
            if !filter(edge, child) {
                continue;
            }
            set.shift_remove(&edge.pid);
            set.insert(edge.pid);
            self.collect_deep(edge.pid, filter, set, expanded);
        }
    }
}
