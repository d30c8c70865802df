pub mod config;
pub mod errors;
pub mod hub;
pub mod http;
pub mod message;
pub mod models;
pub mod services;
pub mod standalone;
