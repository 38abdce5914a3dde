//! Scope configuration for remod.
//!
//! A scope is one independently configured build target: an entry request,
//! a root directory the resolver may not escape, an output directory and the
//! resolution, packing and watch settings that go with them.
//!
//! Configuration is layered with figment:
//!
//! 1. serialized defaults ([`ScopeConfig::default`])
//! 2. `remod.toml`, or the `remod` field of `package.json`
//! 3. `REMOD_`-prefixed environment variables (`__` separates nested keys)

pub mod config;
pub mod discovery;
pub mod error;
pub mod settings;

pub use config::*;
pub use discovery::{ConfigDiscovery, discover};
pub use error::*;
pub use settings::*;
