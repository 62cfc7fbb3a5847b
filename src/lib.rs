//! # Tox Client
//!
//! Lifecycle management for an encrypted peer-to-peer messaging engine.
//!
//! The engine itself is opaque: it is reached only through the [`Engine`]
//! trait, which covers construction, bootstrapping, sending, incoming-message
//! callbacks, a periodic tick and destruction. This crate owns everything
//! around it:
//!
//! - exactly one engine instance per [`Client`], destroyed exactly once
//! - a background event loop that ticks the engine at a fixed cadence
//! - bootstrapping against several nodes, succeeding if any accepts
//! - routing incoming messages to a replaceable handler
//! - orderly shutdown that stops ticking before the engine goes away
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tox_client::{BootstrapTarget, Client, ClientConfig, LoopbackEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new::<LoopbackEngine>(ClientConfig::default()).await?;
//!     client.register_message_handler(|peer, text| println!("{peer}: {text}"));
//!
//!     let node = BootstrapTarget::new("127.0.0.1", 33445, "F".repeat(64));
//!     client.bootstrap(&[node]).await?;
//!     client.start(Duration::from_millis(50)).await?;
//!
//!     client.send_message(0, "hello").await?;
//!     tokio::time::sleep(Duration::from_millis(200)).await;
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`engine`]: the engine trait, its guarded handle and the actor that owns it
//! - [`network`]: bootstrap targets and the multi-target coordinator
//! - [`runtime`]: the event loop and the message dispatcher
//! - [`client`]: the lifecycle manager tying them together
//! - [`utils`]: configuration and error handling

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod engine;
pub mod network;
pub mod runtime;
pub mod utils;

// Re-export commonly used types for convenience
pub use client::{Client, ClientState};
pub use engine::{Engine, EngineHandle, LoopbackEngine, MessageCallback, MessageId, PeerId};
pub use network::{BootstrapCoordinator, BootstrapReport, BootstrapTarget};
pub use runtime::{EventLoopState, EventLoopStats, LogReporter, MessageDispatcher, TickReporter};
pub use utils::{ClientConfig, ClientError, EngineError, Result};

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Tick cadence used when neither configuration nor engine supplies one
    pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

    /// Capacity of the engine actor's request queue
    pub const DEFAULT_REQUEST_QUEUE_DEPTH: usize = 64;
}
