//! Configuration and error handling.

pub mod config;
pub mod errors;

pub use config::*;
pub use errors::*;
