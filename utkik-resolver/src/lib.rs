//! # utkik-resolver
//!
//! Parallel name resolution on reactor threads: a bounded pool of workers,
//! each running its own reactor, races blocking lookups against a
//! wall-clock deadline. Coordination happens exclusively through inboxes
//! and virtual signals; the deadline is enforced by timers on the
//! coordinating reactor.

pub mod engine;
pub mod lookup;

pub mod prelude {
    pub use crate::engine::*;
    pub use crate::lookup::*;
}

pub use engine::{EngineError, EngineOptions, ResolveReport, ResolverEngine, MAX_WORKERS};
pub use lookup::{LookupError, LookupOutcome, LookupTarget, NameResolver, SystemResolver};
