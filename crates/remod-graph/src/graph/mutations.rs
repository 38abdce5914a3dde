//! Mutation methods for ResourceGraph.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;

use super::{GraphInner, ResourceGraph};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::ids::Pid;
use crate::index::ResourceIndex;
use crate::resource::{RequestEdge, Resource};

impl ResourceGraph {
    /// Fetch-or-create the resource for `ctx`.
    ///
    /// A module id maps to exactly one resource. If the context now classifies
    /// differently (a Null that became a file, say) the resource is rebuilt
    /// in place, keeping its dependents, and left dirty.
    pub fn insert(&self, ctx: &Context) -> Result<Pid> {
        let incoming = Resource::from_context(ctx);
        let pid = incoming.pid;
        let mut inner = self.inner.write();

        let Some(existing) = inner.resources.get(&pid) else {
            inner.resources.insert(pid, incoming);
            return Ok(pid);
        };
        if existing.module_id != incoming.module_id {
            return Err(Error::PidCollision {
                pid,
                existing: existing.module_id.clone(),
                incoming: incoming.module_id,
            });
        }
        if existing.kind == incoming.kind && existing.origin == incoming.origin {
            return Ok(pid);
        }

        tracing::debug!(
            module_id = %incoming.module_id,
            from = ?existing.kind,
            to = ?incoming.kind,
            "resource changed kind"
        );
        if let Some(old) = inner.resources.remove(&pid) {
            for dep in &old.dependencies {
                if let Some(child) = inner.resources.get_mut(dep) {
                    child.dependents.shift_remove(&pid);
                }
            }
            let mut replacement = incoming;
            replacement.dependents = old.dependents;
            replacement.bundle = old.bundle;
            inner.resources.insert(pid, replacement);
        }
        Ok(pid)
    }

    /// Put a fully formed resource into the graph, replacing any previous one.
    pub fn insert_resource(&self, resource: Resource) {
        self.inner.write().resources.insert(resource.pid, resource);
    }

    pub fn set_entry(&self, pid: Pid) {
        self.inner.write().entry = Some(pid);
    }

    /// Add a dependency edge, creating forward and reverse mappings.
    pub fn add_dependency(&self, from: Pid, to: Pid) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.resources.contains_key(&to) {
            return Err(Error::UnknownResource(to));
        }
        inner
            .resources
            .get_mut(&from)
            .ok_or(Error::UnknownResource(from))?
            .dependencies
            .insert(to);
        if let Some(child) = inner.resources.get_mut(&to) {
            child.dependents.insert(from);
        }
        Ok(())
    }

    /// Remove the edge `from -> to`.
    ///
    /// A dependency left with no dependents (and not the entry) is evicted,
    /// cascading through its own dependencies. Returns every evicted resource.
    pub fn remove_dependency(&self, from: Pid, to: Pid) -> Vec<Resource> {
        let mut removed = Vec::new();
        self.inner.write().unlink(from, to, &mut removed);
        removed
    }

    /// Replace the request map of `pid` and reconcile its edges.
    ///
    /// Targets must already be in the graph. Returns resources evicted by
    /// vanished requests.
    pub fn update_requests(
        &self,
        pid: Pid,
        requests: IndexMap<String, RequestEdge>,
    ) -> Result<Vec<Resource>> {
        let mut inner = self.inner.write();
        let next: IndexSet<Pid> = requests
            .values()
            .map(|edge| edge.pid)
            .filter(|dep| *dep != pid)
            .collect();
        if let Some(missing) = next.iter().find(|dep| !inner.resources.contains_key(*dep)) {
            return Err(Error::UnknownResource(*missing));
        }

        let previous = {
            let resource = inner
                .resources
                .get_mut(&pid)
                .ok_or(Error::UnknownResource(pid))?;
            resource.requests = requests;
            std::mem::replace(&mut resource.dependencies, next.clone())
        };
        for dep in &next {
            if let Some(child) = inner.resources.get_mut(dep) {
                child.dependents.insert(pid);
            }
        }

        let mut removed = Vec::new();
        for dep in previous.difference(&next) {
            inner.unlink(pid, *dep, &mut removed);
        }
        Ok(removed)
    }

    /// Invalidate `pid` and every transitive dependent.
    ///
    /// Marked resources lose their source checksum and loaded state; the
    /// indices of their dependencies are cleared. Returns the marked pids in
    /// visit order.
    pub fn mark_dirty(&self, pid: Pid) -> Vec<Pid> {
        let mut inner = self.inner.write();
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::from([pid]);
        let mut marked = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(resource) = inner.resources.get_mut(&current) else {
                continue;
            };
            resource.invalidate();
            marked.push(current);
            queue.extend(resource.dependents.iter().copied());
            let dependencies: Vec<Pid> = resource.dependencies.iter().copied().collect();
            for dep in dependencies {
                if let Some(child) = inner.resources.get_mut(&dep) {
                    child.index = None;
                }
            }
        }
        marked
    }

    /// Apply `f` to the resource under the write lock.
    pub fn update<R>(&self, pid: Pid, f: impl FnOnce(&mut Resource) -> R) -> Result<R> {
        let mut inner = self.inner.write();
        let resource = inner
            .resources
            .get_mut(&pid)
            .ok_or(Error::UnknownResource(pid))?;
        Ok(f(resource))
    }

    /// Recompute every index by a depth-first walk of requests from `entry`.
    ///
    /// The first visit assigns the index; unreachable resources have none.
    pub fn reindex(&self, entry: Pid) {
        let mut inner = self.inner.write();
        for resource in inner.resources.values_mut() {
            resource.index = None;
        }

        let mut stack = vec![(entry, ResourceIndex::root())];
        while let Some((pid, index)) = stack.pop() {
            let Some(resource) = inner.resources.get_mut(&pid) else {
                continue;
            };
            if resource.index.is_some() {
                continue;
            }
            let children: Vec<Pid> = resource.requests.values().map(|edge| edge.pid).collect();
            for (position, child) in children.into_iter().enumerate().rev() {
                stack.push((child, index.child(position)));
            }
            resource.index = Some(index);
        }
    }

    /// Clear recorded indices without recomputing them.
    pub fn clear_indices(&self) {
        for resource in self.inner.write().resources.values_mut() {
            resource.index = None;
        }
    }

    /// Evict everything not reachable from `entry`, cycles included.
    pub fn collect_garbage(&self, entry: Pid) -> Vec<Resource> {
        let mut inner = self.inner.write();
        let mut reachable = FxHashSet::default();
        let mut stack = vec![entry];
        while let Some(pid) = stack.pop() {
            if !reachable.insert(pid) {
                continue;
            }
            if let Some(resource) = inner.resources.get(&pid) {
                stack.extend(resource.dependencies.iter().copied());
            }
        }

        let unreachable: Vec<Pid> = inner
            .resources
            .keys()
            .filter(|pid| !reachable.contains(*pid))
            .copied()
            .collect();
        let mut removed = Vec::with_capacity(unreachable.len());
        for pid in unreachable {
            if let Some(resource) = inner.resources.remove(&pid) {
                removed.push(resource);
            }
        }
        for resource in inner.resources.values_mut() {
            resource.dependents.retain(|pid| reachable.contains(pid));
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "collected unreachable resources");
        }
        removed
    }

    /// Remove a single resource and its edges, without cascading.
    pub fn remove(&self, pid: Pid) -> Option<Resource> {
        let mut inner = self.inner.write();
        let resource = inner.resources.remove(&pid)?;
        for dep in &resource.dependencies {
            if let Some(child) = inner.resources.get_mut(dep) {
                child.dependents.shift_remove(&pid);
            }
        }
        for parent in &resource.dependents {
            if let Some(parent) = inner.resources.get_mut(parent) {
                parent.dependencies.shift_remove(&pid);
            }
        }
        Some(resource)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.resources.clear();
        inner.entry = None;
    }
}

impl GraphInner {
    fn unlink(&mut self, from: Pid, to: Pid, removed: &mut Vec<Resource>) {
        if let Some(parent) = self.resources.get_mut(&from) {
            parent.dependencies.shift_remove(&to);
        }
        let entry = self.entry;
        let orphaned = match self.resources.get_mut(&to) {
            Some(child) => {
                child.dependents.shift_remove(&from);
                child.is_orphan(entry)
            }
            None => false,
        };
        if orphaned {
            self.evict(to, removed);
        }
    }

    fn evict(&mut self, pid: Pid, removed: &mut Vec<Resource>) {
        let Some(resource) = self.resources.remove(&pid) else {
            return;
        };
        let dependencies: Vec<Pid> = resource.dependencies.iter().copied().collect();
        removed.push(resource);
        for dep in dependencies {
            self.unlink(pid, dep, removed);
        }
    }
}
