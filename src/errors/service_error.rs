use thiserror::Error;

/// Failure reported by one of the injected collaborator subsystems
/// (identity store, authorization, data snapshot, metrics).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Upstream failure: {0}")]
    Upstream(String),
}
