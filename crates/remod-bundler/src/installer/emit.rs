//! Everything a pass writes besides assets: manifests, the snapshot, and
//! the hooks that run once assets are out.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use remod_graph::{Manifest, PackageJson, Pid, package_root_of};
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::InstallerInner;
use crate::bundle::Asset;
use crate::cache::Snapshot;
use crate::pipeline::{HookContext, Phase, Stage};
use crate::{Error, Result};

/// Run `phase`/`stage` hooks for every processed resource.
pub(super) async fn hooks(
    inner: &InstallerInner,
    processed: &[Pid],
    phase: Phase,
    stage: Stage,
) -> Result<()> {
    let hooks = &inner.options.hooks;
    if !hooks.has(phase, stage) {
        return Ok(());
    }
    let graph = inner.factory.graph();
    for pid in processed {
        let Some(resource) = graph.get(*pid) else {
            continue;
        };
        let pipeline = resource
            .path()
            .and_then(|path| inner.options.pipelines.select(path))
            .map(|p| p.name())
            .unwrap_or("unknown");
        let ctx = HookContext {
            pid: *pid,
            module_id: resource.module_id.clone(),
            slug: resource.slug.clone(),
            path: resource.path().map(|p| p.to_path_buf()),
            pipeline,
            phase,
            stage,
            size: Some(resource.size),
        };
        hooks.run(&ctx).await.map_err(|source| Error::Pipeline {
            pipeline: pipeline.to_string(),
            module_id: resource.module_id.clone(),
            phase,
            source,
        })?;
    }
    Ok(())
}

/// Write manifests for processed resources and everything depending on
/// them, since their dependency lists may have changed too.
pub(super) async fn manifests(
    inner: &InstallerInner,
    processed: &[Pid],
    assets: &[Asset],
) -> Result<Vec<PathBuf>> {
    let graph = inner.factory.graph();
    let asset_of: FxHashMap<Pid, &str> = assets
        .iter()
        .flat_map(|asset| asset.members.iter().map(move |pid| (*pid, asset.id.as_str())))
        .collect();

    let mut changed = BTreeSet::new();
    let mut queue: Vec<Pid> = processed.to_vec();
    while let Some(pid) = queue.pop() {
        if !changed.insert(pid) {
            continue;
        }
        if let Some(dependents) = graph.with(pid, |r| r.dependents.iter().copied().collect::<Vec<_>>()) {
            queue.extend(dependents);
        }
    }

    let mut written = Vec::new();
    for pid in changed {
        let Some(Some(output_slug)) = graph.with(pid, |r| {
            (r.is_normal() && r.output_type.as_deref() != Some("raw"))
                .then(|| r.output_slug.clone())
                .flatten()
        }) else {
            continue;
        };

        let manifest = match Manifest::build(
            graph,
            pid,
            |r| asset_of.get(&r.pid).map(|id| id.to_string()),
            Manifest::same_type,
        ) {
            Ok(manifest) => manifest,
            Err(remod_graph::Error::NotLoaded(module_id)) => {
                tracing::debug!(%module_id, "skipping manifest over unloaded dependency");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let packages = packages(inner, &manifest).await?;
        let manifest = manifest.with_packages(packages);

        let path = inner
            .options
            .output_dir
            .join(format!("{output_slug}.manifest.json"));
        inner
            .runtime
            .write_file(&path, manifest.to_json()?.as_bytes())
            .await?;
        written.push(path);
    }
    Ok(written)
}

/// `package.json` excerpts for every package a manifest touches.
async fn packages(inner: &InstallerInner, manifest: &Manifest) -> Result<BTreeMap<String, Value>> {
    let graph = inner.factory.graph();
    let root = &inner.options.root_dir;
    let mut ids: Vec<String> = manifest.package_ids().into_iter().map(str::to_string).collect();
    ids.sort();

    let mut packages = BTreeMap::new();
    for id in ids {
        let dir = if id == "." {
            root.clone()
        } else {
            let slug = std::iter::once(manifest.meta())
                .chain(manifest.dependencies())
                .filter(|entry| entry.package_id.as_deref() == Some(id.as_str()))
                .find_map(|entry| graph.with(entry.pid, |r| r.slug.clone()).flatten());
            match slug.and_then(|slug| package_root_of(&slug, &id)) {
                Some(relative) => root.join(relative),
                None => continue,
            }
        };
        if let Some(package) = PackageJson::load(inner.runtime.as_ref(), &dir).await? {
            let picked = package.pick(&inner.options.resolve.main_fields);
            packages.insert(id, Value::Object(picked));
        }
    }
    Ok(packages)
}

pub(super) async fn snapshot(
    inner: &InstallerInner,
    entry: Pid,
    assets: &BTreeMap<String, Vec<Pid>>,
) -> Result<()> {
    let records = inner.factory.graph().export(entry)?;
    Snapshot::new(records, assets.clone(), inner.options.fingerprint.clone())
        .save(inner.runtime.as_ref(), &inner.options.output_dir)
        .await?;
    Ok(())
}
