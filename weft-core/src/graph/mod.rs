//! Dependency Graph
//!
//! This module holds the two shared tables behind the reactive system:
//!
//! - the dependency graph, which records which effects read which fields of
//!   which targets, and
//! - the job queue, which batches deferred effects into a single flush.
//!
//! Both are owned by a [`Runtime`](crate::Runtime) rather than living in
//! process-wide statics, so independent runtimes never observe each other.
//!
//! # Design Decisions
//!
//! 1. The graph is keyed by target id and field, not by the target object, so
//!    it never keeps state alive. Each target entry carries a weak liveness
//!    token; entries whose target is gone are dropped by
//!    [`Runtime::collect_garbage`](crate::Runtime::collect_garbage).
//!
//! 2. Subscriber sets are insertion ordered, which makes notification order
//!    deterministic (subscription order).
//!
//! 3. A reverse index (effect -> fields) makes clearing an effect's
//!    subscriptions before it re-runs proportional to what it read, not to the
//!    size of the graph.

mod deps;
mod scheduler;

pub(crate) use deps::DepGraph;
pub(crate) use scheduler::{Enqueued, JobQueue};
