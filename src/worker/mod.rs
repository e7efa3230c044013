//! Worker-side liveness: identity, heartbeat emitter, and lifecycle hooks.
//!
//! # Components
//!
//! - [`WorkerId`]: stable identity shared by the registry and heartbeat keys
//! - [`HeartbeatEmitter`]: background loop writing proof-of-life to the store
//! - [`Worker`]: owns one emitter and ties it to registration
//!
//! # Lifecycle
//!
//! 1. The host process finishes its own startup
//! 2. [`Worker::startup`] registers the worker and starts the heart
//! 3. Every interval the heart re-adds the worker to `workers` and stamps
//!    `worker:<id>:heartbeat`
//! 4. [`Worker::shutdown`] stops the heart, removes the heartbeat key and
//!    deregisters

pub mod heartbeat;
pub mod identity;
pub mod lifecycle;

pub use heartbeat::HeartbeatEmitter;
pub use identity::WorkerId;
pub use lifecycle::Worker;
