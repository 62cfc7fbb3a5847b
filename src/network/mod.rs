//! Network joining.
//!
//! This module connects the engine to the peer network through one or more
//! bootstrap nodes.

pub mod bootstrap;

pub use bootstrap::*;
