//! Hooks run around each phase of processing a resource.
//!
//! Every phase has a `Pre` and a `Post` half. Hooks registered for the same
//! half run in registration order; a failing hook fails the resource the same
//! way a pipeline error does.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use remod_graph::Pid;

use super::PipelineError;

/// Processing phases, in the order a resource goes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Read = 0,
    Parse = 10,
    Requests = 20,
    Generate = 30,
    /// After the asset holding the resource has been written.
    Write = 40,
    /// After the whole install has packed and written its assets.
    Complete = 50,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Read => "read",
            Phase::Parse => "parse",
            Phase::Requests => "requests",
            Phase::Generate => "generate",
            Phase::Write => "write",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Pre,
    Post,
}

/// What a hook gets to see.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub pid: Pid,
    pub module_id: String,
    pub slug: Option<String>,
    pub path: Option<PathBuf>,
    pub pipeline: &'static str,
    pub phase: Phase,
    pub stage: Stage,
    /// Size of the generated output, once there is one.
    pub size: Option<usize>,
}

#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn phase(&self) -> Phase;

    fn stage(&self) -> Stage {
        Stage::Post
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), PipelineError>;
}

/// Hooks kept sorted by `(phase, stage)`.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<(Phase, Stage, Arc<dyn Hook>)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<H: Hook + 'static>(&mut self, hook: H) {
        let (phase, stage) = (hook.phase(), hook.stage());
        let at = self
            .hooks
            .partition_point(|(p, s, _)| (*p, *s) <= (phase, stage));
        self.hooks.insert(at, (phase, stage, Arc::new(hook)));
    }

    pub fn has(&self, phase: Phase, stage: Stage) -> bool {
        self.hooks.iter().any(|(p, s, _)| *p == phase && *s == stage)
    }

    pub async fn run(&self, ctx: &HookContext) -> Result<(), PipelineError> {
        for (_, _, hook) in self
            .hooks
            .iter()
            .filter(|(p, s, _)| *p == ctx.phase && *s == ctx.stage)
        {
            tracing::trace!(hook = hook.name(), phase = %ctx.phase, "running hook");
            hook.run(ctx).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|(p, s, h)| (p, s, h.name())))
            .finish()
    }
}
