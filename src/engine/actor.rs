//! Serialized access to the engine.
//!
//! The engine is not safe for concurrent use, yet both the event loop and
//! foreground callers need it. A single actor owns the [`EngineHandle`] on a
//! dedicated blocking thread and executes requests from an ordered channel
//! one at a time. Callers hold an [`EngineMailbox`] and await replies.

use crate::engine::{Engine, EngineHandle, MessageCallback, MessageId, PeerId};
use crate::network::{BootstrapCoordinator, BootstrapReport, BootstrapTarget};
use crate::utils::{EngineConfig, EngineError, InitializationError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Requests executed by the engine actor
enum EngineRequest {
    Bootstrap {
        targets: Vec<BootstrapTarget>,
        reply: oneshot::Sender<BootstrapReport>,
    },
    Send {
        peer_id: PeerId,
        text: String,
        reply: oneshot::Sender<Result<MessageId, EngineError>>,
    },
    Tick {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Interval {
        reply: oneshot::Sender<Result<Duration, EngineError>>,
    },
    Destroy {
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable sender side of the engine actor.
///
/// Every method suspends until the actor has executed the request. Once the
/// actor has destroyed the engine, every method fails with
/// [`EngineError::Destroyed`].
#[derive(Clone)]
pub struct EngineMailbox {
    sender: mpsc::Sender<EngineRequest>,
}

/// Spawn the actor and construct the engine on it.
///
/// The engine is built on the actor thread and never leaves it. `callback` is
/// installed before any request is served. Resolves once construction has
/// succeeded or failed.
pub async fn spawn_engine_actor<E, F>(
    config: EngineConfig,
    queue_depth: usize,
    factory: F,
    callback: MessageCallback,
) -> Result<(EngineMailbox, JoinHandle<()>), InitializationError>
where
    E: Engine + 'static,
    F: FnOnce(&EngineConfig) -> Result<E, EngineError> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(queue_depth.max(1));
    let (ready_tx, ready_rx) = oneshot::channel();

    let task = tokio::task::spawn_blocking(move || {
        let mut handle = match EngineHandle::from_factory(&config, factory) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        if let Err(source) = handle.set_message_callback(callback) {
            let _ = ready_tx.send(Err(InitializationError { source }));
            return;
        }
        if ready_tx.send(Ok(())).is_err() {
            return;
        }
        serve(handle, receiver);
    });

    match ready_rx.await {
        Ok(Ok(())) => Ok((EngineMailbox { sender }, task)),
        Ok(Err(e)) => {
            let _ = task.await;
            Err(e)
        }
        Err(_) => Err(InitializationError {
            source: match task.await {
                Err(e) => EngineError::Unavailable {
                    reason: format!("engine constructor panicked: {e}"),
                },
                Ok(()) => EngineError::Destroyed,
            },
        }),
    }
}

fn serve<E: Engine>(mut handle: EngineHandle<E>, mut requests: mpsc::Receiver<EngineRequest>) {
    log::debug!("Engine actor serving requests");

    while let Some(request) = requests.blocking_recv() {
        match request {
            EngineRequest::Bootstrap { targets, reply } => {
                let report = BootstrapCoordinator::new(&targets).run(&mut handle);
                let _ = reply.send(report);
            }
            EngineRequest::Send {
                peer_id,
                text,
                reply,
            } => {
                let _ = reply.send(handle.send_message(peer_id, &text));
            }
            EngineRequest::Tick { reply } => {
                let _ = reply.send(handle.iterate());
            }
            EngineRequest::Interval { reply } => {
                let _ = reply.send(handle.iteration_interval());
            }
            EngineRequest::Destroy { reply } => {
                let _ = reply.send(handle.destroy());
                break;
            }
        }
    }

    // Channel closed without an explicit destroy: every mailbox was dropped.
    handle.destroy();
    log::debug!("Engine actor stopped");
}

impl EngineMailbox {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| EngineError::Destroyed)?;
        response.await.map_err(|_| EngineError::Destroyed)
    }

    /// Attempt every target and report each outcome
    pub async fn bootstrap(&self, targets: Vec<BootstrapTarget>) -> Result<BootstrapReport, EngineError> {
        self.request(|reply| EngineRequest::Bootstrap { targets, reply })
            .await
    }

    /// Submit a message to a friend
    pub async fn send_message(&self, peer_id: PeerId, text: String) -> Result<MessageId, EngineError> {
        self.request(|reply| EngineRequest::Send {
            peer_id,
            text,
            reply,
        })
        .await?
    }

    /// Run one engine tick
    pub async fn tick(&self) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Tick { reply }).await?
    }

    /// The engine's preferred tick cadence
    pub async fn iteration_interval(&self) -> Result<Duration, EngineError> {
        self.request(|reply| EngineRequest::Interval { reply })
            .await?
    }

    /// Destroy the engine and stop the actor.
    ///
    /// Returns false if the engine was already gone.
    pub async fn destroy(&self) -> bool {
        self.request(|reply| EngineRequest::Destroy { reply })
            .await
            .unwrap_or(false)
    }

    /// True once the actor has stopped accepting requests
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
