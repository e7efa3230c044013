//! Deciding which workers are dead and cleaning up after them.
//!
//! - [`StalenessPolicy`]: pure verdict from stored timestamps
//! - [`Reconciler`]: applies the verdict to every registered worker,
//!   deregisters the dead and deletes orphaned heartbeat keys
//!
//! # Pass Outline
//!
//! 1. List every `worker:*:heartbeat` key as a cleanup candidate
//! 2. For each registered worker, prune it if stale and strike its key from
//!    the candidates
//! 3. Delete the candidates left over: nobody registered owns them
//!
//! Any store or registry error aborts the pass. The next pass starts from
//! scratch, so nothing is retried within a pass.

pub mod policy;
pub mod reconciler;

pub use policy::StalenessPolicy;
pub use reconciler::{PruneReport, Reconciler, WorkerStatus};
