pub mod identity;
pub mod metrics;
pub mod permission;
pub mod snapshot;
