pub mod config;
pub mod error;
pub mod keys;
pub mod liveness;
pub mod registry;
pub mod shutdown;
pub mod store;
pub mod worker;
