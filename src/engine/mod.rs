//! Engine capability surface and ownership.
//!
//! The protocol engine is an external collaborator. This module defines the
//! [`Engine`] trait it must satisfy, the [`EngineHandle`] that owns a live
//! instance, and the actor that serializes every call into it.

pub mod actor;
pub mod handle;
pub mod loopback;

pub use actor::{spawn_engine_actor, EngineMailbox};
pub use handle::EngineHandle;
pub use loopback::LoopbackEngine;

use crate::utils::{EngineConfig, EngineError};
use std::time::Duration;

/// Engine-assigned friend number
pub type PeerId = u32;

/// Engine-assigned identifier of a submitted message
pub type MessageId = u32;

/// Callback the engine invokes for every incoming friend message.
///
/// Runs synchronously inside [`Engine::iterate`].
pub type MessageCallback = Box<dyn FnMut(PeerId, &str) + Send>;

/// Capability set of a messaging engine.
///
/// Implementations need not be thread-safe: every call is made from the single
/// execution context that owns the instance.
pub trait Engine {
    /// Construct an engine from configuration
    fn create(config: &EngineConfig) -> Result<Self, EngineError>
    where
        Self: Sized;

    /// Connect to a bootstrap node
    fn bootstrap(&mut self, address: &str, port: u16, public_key: &str) -> Result<(), EngineError>;

    /// Queue a text message for a friend
    fn send_message(&mut self, peer_id: PeerId, text: &str) -> Result<MessageId, EngineError>;

    /// Install the incoming-message callback, replacing any previous one
    fn set_message_callback(&mut self, callback: MessageCallback);

    /// Perform one unit of network processing
    fn iterate(&mut self) -> Result<(), EngineError>;

    /// Cadence at which the engine wants [`Engine::iterate`] to be called
    fn iteration_interval(&self) -> Duration {
        crate::defaults::DEFAULT_TICK_INTERVAL
    }

    /// Release every resource held by the engine
    fn destroy(&mut self);
}
