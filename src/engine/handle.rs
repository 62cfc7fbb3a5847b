//! Single-owner token for a live engine instance.

use crate::engine::{Engine, MessageCallback, MessageId, PeerId};
use crate::network::BootstrapTarget;
use crate::utils::{EngineConfig, EngineError, InitializationError};
use std::time::Duration;

/// Owns one engine instance and releases it exactly once.
///
/// Not `Clone`. Every call goes through the handle; once destroyed, calls
/// return [`EngineError::Destroyed`] without touching the engine.
pub struct EngineHandle<E: Engine> {
    engine: Option<E>,
}

impl<E: Engine> EngineHandle<E> {
    /// Create an engine with its own constructor
    pub fn create(config: &EngineConfig) -> Result<Self, InitializationError> {
        Self::from_factory(config, E::create)
    }

    /// Create an engine with a caller-supplied constructor
    pub fn from_factory<F>(config: &EngineConfig, factory: F) -> Result<Self, InitializationError>
    where
        F: FnOnce(&EngineConfig) -> Result<E, EngineError>,
    {
        let engine = factory(config)?;
        log::debug!("Engine instance created");
        Ok(Self {
            engine: Some(engine),
        })
    }

    /// True until [`EngineHandle::destroy`] has run
    pub fn is_live(&self) -> bool {
        self.engine.is_some()
    }

    fn engine_mut(&mut self) -> Result<&mut E, EngineError> {
        self.engine.as_mut().ok_or(EngineError::Destroyed)
    }

    /// Connect to one bootstrap target
    pub fn bootstrap(&mut self, target: &BootstrapTarget) -> Result<(), EngineError> {
        self.engine_mut()?
            .bootstrap(&target.address, target.port, &target.public_key)
    }

    /// Submit a message for delivery
    pub fn send_message(&mut self, peer_id: PeerId, text: &str) -> Result<MessageId, EngineError> {
        self.engine_mut()?.send_message(peer_id, text)
    }

    /// Install the incoming-message callback
    pub fn set_message_callback(&mut self, callback: MessageCallback) -> Result<(), EngineError> {
        self.engine_mut()?.set_message_callback(callback);
        Ok(())
    }

    /// Run one tick of network processing
    pub fn iterate(&mut self) -> Result<(), EngineError> {
        self.engine_mut()?.iterate()
    }

    /// The engine's preferred tick cadence
    pub fn iteration_interval(&self) -> Result<Duration, EngineError> {
        self.engine
            .as_ref()
            .map(E::iteration_interval)
            .ok_or(EngineError::Destroyed)
    }

    /// Release the engine. Returns false if it was already released.
    pub fn destroy(&mut self) -> bool {
        match self.engine.take() {
            Some(mut engine) => {
                engine.destroy();
                log::debug!("Engine instance destroyed");
                true
            }
            None => false,
        }
    }
}

impl<E: Engine> Drop for EngineHandle<E> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        destroyed: Arc<AtomicUsize>,
    }

    impl Engine for CountingEngine {
        fn create(_config: &EngineConfig) -> Result<Self, EngineError> {
            Err(EngineError::Unavailable {
                reason: "use from_factory".to_string(),
            })
        }

        fn bootstrap(&mut self, _: &str, _: u16, _: &str) -> Result<(), EngineError> {
            Ok(())
        }

        fn send_message(&mut self, _: PeerId, _: &str) -> Result<MessageId, EngineError> {
            Ok(1)
        }

        fn set_message_callback(&mut self, _: MessageCallback) {}

        fn iterate(&mut self) -> Result<(), EngineError> {
            Ok(())
        }

        fn destroy(&mut self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_handle() -> (EngineHandle<CountingEngine>, Arc<AtomicUsize>) {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = destroyed.clone();
        let handle = EngineHandle::from_factory(&EngineConfig::default(), move |_| {
            Ok(CountingEngine { destroyed: counter })
        })
        .unwrap();
        (handle, destroyed)
    }

    #[test]
    fn test_create_failure_is_initialization_error() {
        let result = EngineHandle::<CountingEngine>::create(&EngineConfig::default());
        let error = result.err().unwrap();
        assert!(matches!(error.source, EngineError::Unavailable { .. }));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (mut handle, destroyed) = counting_handle();
        assert!(handle.is_live());

        assert!(handle.destroy());
        assert!(!handle.destroy());
        drop(handle);

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_calls_after_destroy_are_rejected() {
        let (mut handle, _destroyed) = counting_handle();
        handle.destroy();

        assert_eq!(handle.iterate(), Err(EngineError::Destroyed));
        assert_eq!(handle.send_message(1, "hi"), Err(EngineError::Destroyed));
        assert_eq!(handle.iteration_interval(), Err(EngineError::Destroyed));
    }

    #[test]
    fn test_drop_destroys_live_engine() {
        let (handle, destroyed) = counting_handle();
        drop(handle);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }
}
