use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Client transport closed")]
    Closed,
}
