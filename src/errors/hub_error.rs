use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}
