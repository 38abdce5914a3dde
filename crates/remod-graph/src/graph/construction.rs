use std::sync::Arc;

use parking_lot::RwLock;

use super::{GraphInner, ResourceGraph};

impl ResourceGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(GraphInner::default())),
        }
    }
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}
