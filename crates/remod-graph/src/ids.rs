//! Identity rules: pids, module ids, package ids and slugs.

use std::fmt;
use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static URL_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z][a-zA-Z\d+\-.]+:|//)").expect("url pattern is valid")
});

static PACKAGE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\.|(?:@[^/]+/)?[^/]+)(?:/|$)").expect("package pattern is valid")
});

/// Numeric module identity shared with the runtime loader.
///
/// Derived from the module id alone and masked to 53 bits so it survives a
/// round trip through a JSON number unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(u64);

impl Pid {
    pub const MASK: u64 = (1 << 53) - 1;

    pub fn of(module_id: &str) -> Self {
        Pid(seahash::hash(module_id.as_bytes()) & Self::MASK)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn is_absolute_url(value: &str) -> bool {
    URL_SCHEME.is_match(value)
}

/// Whether `slug` lies inside one of the package directories.
pub fn is_installed_package(slug: &str, module_dirs: &[String]) -> bool {
    module_dirs
        .iter()
        .any(|dir| slug.starts_with(&format!("{dir}/")) || slug.contains(&format!("/{dir}/")))
}

/// Project-relative, `/`-separated path of `path`.
///
/// Paths outside of `root` keep their full form.
pub fn slug_of(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical module id of a file slug.
///
/// Local files get a `./` prefix; package files drop their leading package
/// directory (`node_modules/react/index.js` becomes `react/index.js`).
pub fn module_id_of(slug: &str, module_dirs: &[String]) -> String {
    let normalized = slug.trim_start_matches("./").trim_start_matches('/');
    if !is_installed_package(normalized, module_dirs) {
        return format!("./{normalized}");
    }
    for dir in module_dirs {
        if let Some(rest) = normalized.strip_prefix(&format!("{dir}/")) {
            return rest.to_string();
        }
    }
    normalized.to_string()
}

/// Owning package of `module_id`: the package name after the last package
/// directory, `.` for local modules, `None` for URLs.
pub fn package_id_of(module_id: &str, module_dirs: &[String]) -> Option<String> {
    if is_absolute_url(module_id) {
        return None;
    }
    let mut segment = module_id;
    for dir in module_dirs {
        let marker = format!("{dir}/");
        if let Some(idx) = segment.rfind(&marker) {
            segment = &segment[idx + marker.len()..];
        }
    }
    PACKAGE_SEGMENT
        .captures(segment)
        .map(|captures| captures[1].to_string())
}

/// Slug of the directory holding `package_id`, derived from a member's slug.
///
/// `node_modules/@scope/pkg/lib/x.js` with package `@scope/pkg` yields
/// `node_modules/@scope/pkg`.
pub fn package_root_of(slug: &str, package_id: &str) -> Option<String> {
    let needle = format!("{package_id}/");
    slug.rfind(&needle)
        .map(|idx| slug[..idx + package_id.len()].to_string())
}
