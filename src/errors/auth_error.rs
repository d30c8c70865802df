use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User not logged in")]
    MissingCredentials,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Could not verify credentials: {0}")]
    Unavailable(String),
}
