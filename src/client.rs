//! Client lifecycle and coordination.
//!
//! [`Client`] composes the engine actor, the event loop and the message
//! dispatcher into one object that is constructed once and shut down once.
//! Every method takes `&self`, so a client can be shared behind an `Arc` and
//! used from any task.

use crate::engine::{spawn_engine_actor, Engine, EngineMailbox, PeerId};
use crate::network::{BootstrapReport, BootstrapTarget};
use crate::runtime::{
    DispatchStats, EventLoopController, EventLoopState, EventLoopStats, LogReporter,
    MessageDispatcher, TickReporter,
};
use crate::utils::{ClientConfig, ClientError, EngineConfig, EngineError, Result, SendError, ShutdownError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Coarse client lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Engine live, event loop not started
    Created,
    /// Event loop ticking
    Running,
    /// Event loop stopped or client shut down
    Stopped,
}

/// A messaging client owning exactly one engine instance
pub struct Client {
    id: Uuid,
    config: ClientConfig,
    mailbox: EngineMailbox,
    dispatcher: MessageDispatcher,
    event_loop: Mutex<EventLoopController>,
    /// `None` once the actor has been joined
    actor: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Client {
    /// Create a client with the engine's own constructor
    pub async fn new<E>(config: ClientConfig) -> Result<Self>
    where
        E: Engine + 'static,
    {
        Self::with_factory(config, E::create).await
    }

    /// Create a client whose engine is built by `factory`.
    ///
    /// The factory runs on the engine actor's thread.
    pub async fn with_factory<E, F>(config: ClientConfig, factory: F) -> Result<Self>
    where
        E: Engine + 'static,
        F: FnOnce(&EngineConfig) -> std::result::Result<E, EngineError> + Send + 'static,
    {
        Self::build(config, factory, Arc::new(LogReporter)).await
    }

    /// Create a client that reports tick failures to `reporter`
    pub async fn with_reporter<E, F>(
        config: ClientConfig,
        factory: F,
        reporter: Arc<dyn TickReporter>,
    ) -> Result<Self>
    where
        E: Engine + 'static,
        F: FnOnce(&EngineConfig) -> std::result::Result<E, EngineError> + Send + 'static,
    {
        Self::build(config, factory, reporter).await
    }

    async fn build<E, F>(config: ClientConfig, factory: F, reporter: Arc<dyn TickReporter>) -> Result<Self>
    where
        E: Engine + 'static,
        F: FnOnce(&EngineConfig) -> std::result::Result<E, EngineError> + Send + 'static,
    {
        config.validate()?;

        let id = Uuid::new_v4();
        let dispatcher = MessageDispatcher::new();
        let (mailbox, actor) = spawn_engine_actor(
            config.engine.clone(),
            config.client.request_queue_depth,
            factory,
            dispatcher.bridge(),
        )
        .await?;

        log::info!("Client {} created", id);

        Ok(Self {
            id,
            config,
            mailbox,
            dispatcher,
            event_loop: Mutex::new(EventLoopController::new(reporter)),
            actor: Mutex::new(Some(actor)),
            closed: AtomicBool::new(false),
        })
    }

    /// Unique identifier used in log output
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ClientError::Closed)
        } else {
            Ok(())
        }
    }

    fn closed_on_destroyed(error: EngineError) -> ClientError {
        match error {
            EngineError::Destroyed => ClientError::Closed,
            other => other.into(),
        }
    }

    /// Join the network through `targets`.
    ///
    /// Succeeds if any target accepted the engine. Partial failures are
    /// logged and otherwise dropped; use
    /// [`Client::bootstrap_with_report`] to inspect them.
    pub async fn bootstrap(&self, targets: &[BootstrapTarget]) -> Result<()> {
        let report = self.bootstrap_with_report(targets).await?;
        if report.is_joined() {
            for failure in report.failures() {
                log::warn!("Client {}: {}", self.id, failure);
            }
        }
        report.into_result().map_err(ClientError::from)
    }

    /// Attempt every target and return each outcome
    pub async fn bootstrap_with_report(&self, targets: &[BootstrapTarget]) -> Result<BootstrapReport> {
        self.ensure_open()?;
        self.mailbox
            .bootstrap(targets.to_vec())
            .await
            .map_err(Self::closed_on_destroyed)
    }

    /// Bootstrap with the targets from configuration
    pub async fn bootstrap_configured(&self) -> Result<()> {
        let targets = self.config.client.bootstrap_nodes.clone();
        self.bootstrap(&targets).await
    }

    /// Submit a message to a friend.
    ///
    /// Success confirms submission to the engine, not delivery.
    pub async fn send_message(&self, peer_id: PeerId, text: &str) -> Result<()> {
        self.ensure_open()?;
        match self.mailbox.send_message(peer_id, text.to_string()).await {
            Ok(message_id) => {
                log::debug!("Client {}: message {} queued for {}", self.id, message_id, peer_id);
                Ok(())
            }
            Err(EngineError::Destroyed) => Err(ClientError::Closed),
            Err(source) => Err(SendError { peer_id, source }.into()),
        }
    }

    /// Replace the incoming-message handler
    pub fn register_message_handler<H>(&self, handler: H)
    where
        H: Fn(PeerId, &str) + Send + Sync + 'static,
    {
        self.dispatcher.register_handler(handler);
    }

    /// Remove the incoming-message handler
    pub fn clear_message_handler(&self) {
        self.dispatcher.clear_handler();
    }

    /// Start ticking the engine every `interval`
    pub async fn start(&self, interval: Duration) -> Result<()> {
        self.ensure_open()?;
        let mut event_loop = self.event_loop.lock().await;
        // A shutdown may have stopped the loop while we waited for the lock.
        self.ensure_open()?;
        event_loop.start(self.mailbox.clone(), interval)
    }

    /// Start with the configured interval, or the engine's own suggestion
    pub async fn start_default(&self) -> Result<()> {
        let interval = match self.config.client.tick_interval() {
            Some(interval) => interval,
            None => self.suggested_interval().await?,
        };
        self.start(interval).await
    }

    /// The engine's preferred tick cadence
    pub async fn suggested_interval(&self) -> Result<Duration> {
        self.ensure_open()?;
        self.mailbox
            .iteration_interval()
            .await
            .map_err(Self::closed_on_destroyed)
    }

    /// Stop ticking and wait for the loop to exit. The engine stays alive.
    pub async fn stop(&self) -> Result<()> {
        self.event_loop.lock().await.stop().await?;
        Ok(())
    }

    /// Stop the event loop, then destroy the engine.
    ///
    /// Idempotent and safe without a prior [`Client::start`]. Concurrent
    /// callers wait for the first teardown to finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);

        let mut actor = self.actor.lock().await;
        let Some(task) = actor.take() else {
            log::debug!("Client {} already shut down", self.id);
            return Ok(());
        };

        log::info!("Client {} shutting down", self.id);
        let stopped = self.event_loop.lock().await.stop().await;

        let destroyed = self.mailbox.destroy().await;
        let joined = task.await.map_err(|e| ShutdownError::TaskFailed {
            task: "engine actor",
            reason: e.to_string(),
        });
        log::info!(
            "Client {} shut down (engine {})",
            self.id,
            if destroyed { "destroyed" } else { "already gone" }
        );

        stopped?;
        joined?;
        Ok(())
    }

    /// Coarse lifecycle state
    pub async fn state(&self) -> ClientState {
        if self.closed.load(Ordering::SeqCst) {
            return ClientState::Stopped;
        }
        match self.event_loop.lock().await.state() {
            EventLoopState::Idle => ClientState::Created,
            EventLoopState::Running => ClientState::Running,
            EventLoopState::Stopping | EventLoopState::Stopped => ClientState::Stopped,
        }
    }

    /// True once [`Client::shutdown`] has been called
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Event loop state
    pub async fn event_loop_state(&self) -> EventLoopState {
        self.event_loop.lock().await.state()
    }

    /// Event loop counters
    pub async fn event_loop_stats(&self) -> EventLoopStats {
        self.event_loop.lock().await.stats()
    }

    /// Message delivery counters
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}
