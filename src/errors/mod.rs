pub mod auth_error;
pub mod hub_error;
pub mod service_error;
pub mod transport_error;
