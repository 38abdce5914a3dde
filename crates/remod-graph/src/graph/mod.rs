//! The resource graph: an arena of [`Resource`]s keyed by pid.
//!
//! Edges are stored as pid sets on both ends (`dependencies` and
//! `dependents`), so cycles need no special handling beyond visited sets.

mod construction;
mod mutations;
mod queries;
mod serialization;

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::ids::Pid;
use crate::resource::Resource;

pub use serialization::{RequestRecord, ResourceRecord};

/// Shared handle to the graph. Clones see the same data.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    pub(crate) inner: Arc<RwLock<GraphInner>>,
}

#[derive(Debug, Default)]
pub(crate) struct GraphInner {
    pub resources: FxHashMap<Pid, Resource>,
    pub entry: Option<Pid>,
}
