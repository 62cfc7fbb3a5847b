//! Event loop and message dispatch.

pub mod dispatcher;
pub mod event_loop;

pub use dispatcher::*;
pub use event_loop::*;
