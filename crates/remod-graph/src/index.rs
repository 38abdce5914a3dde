use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a resource in a depth-first walk of the request tree.
///
/// Compares lexicographically: a parent sorts before its children, earlier
/// requests before later ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIndex(Vec<u32>);

impl ResourceIndex {
    pub fn root() -> Self {
        Self(vec![0])
    }

    pub fn child(&self, position: usize) -> Self {
        let mut path = self.0.clone();
        path.push(u32::try_from(position).unwrap_or(u32::MAX));
        Self(path)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl From<Vec<u32>> for ResourceIndex {
    fn from(path: Vec<u32>) -> Self {
        Self(path)
    }
}

impl fmt::Display for ResourceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join("."))
    }
}
