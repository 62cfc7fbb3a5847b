//! Periodic engine ticking.
//!
//! The controller owns one background task that asks the engine actor for a
//! tick every interval. Each tick is awaited before the next interval starts,
//! so ticks never overlap and a slow tick only delays the next one.

use crate::engine::EngineMailbox;
use crate::utils::{ClientError, EngineError, Result, ShutdownError, TickError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Lifecycle of the ticking task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLoopState {
    /// Never started
    Idle,
    /// Ticking
    Running,
    /// Stop requested, task not yet joined
    Stopping,
    /// Task has exited
    Stopped,
}

/// Receives tick failures. The loop keeps running after a report.
pub trait TickReporter: Send + Sync {
    /// Called once per failed tick
    fn report(&self, error: &TickError);
}

/// Reports tick failures through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

/// Counters for one loop lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLoopStats {
    /// Ticks issued to the engine
    pub ticks: u64,
    /// Ticks that returned an error
    pub failures: u64,
    /// Completion time of the most recent tick
    pub last_tick_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct LoopCounters {
    ticks: AtomicU64,
    failures: AtomicU64,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
}

/// Drives the engine tick on a dedicated task
pub struct EventLoopController {
    state: EventLoopState,
    cancel: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    counters: Arc<LoopCounters>,
    reporter: Arc<dyn TickReporter>,
}

impl fmt::Display for EventLoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

impl TickReporter for LogReporter {
    fn report(&self, error: &TickError) {
        log::warn!("Event loop: {}", error);
    }
}

impl EventLoopController {
    /// Create an idle controller
    pub fn new(reporter: Arc<dyn TickReporter>) -> Self {
        Self {
            state: EventLoopState::Idle,
            cancel: None,
            task: None,
            counters: Arc::new(LoopCounters::default()),
            reporter,
        }
    }

    /// Current state.
    ///
    /// A loop that ended on its own (fatal engine error) reports `Stopped`
    /// even before it has been joined.
    pub fn state(&self) -> EventLoopState {
        match (&self.state, &self.task) {
            (EventLoopState::Running, Some(task)) if task.is_finished() => EventLoopState::Stopped,
            (state, _) => *state,
        }
    }

    /// Start ticking every `interval`.
    ///
    /// A no-op while running. Rejected once the loop has been stopped: a
    /// client gets one loop per lifetime.
    pub fn start(&mut self, mailbox: EngineMailbox, interval: Duration) -> Result<()> {
        match self.state() {
            EventLoopState::Idle => {}
            EventLoopState::Running => {
                log::debug!("Event loop already running");
                return Ok(());
            }
            state => {
                return Err(ClientError::InvalidState {
                    operation: "start event loop",
                    state: state.to_string(),
                })
            }
        }

        if interval.is_zero() {
            return Err(ClientError::InvalidState {
                operation: "start event loop with a zero interval",
                state: self.state.to_string(),
            });
        }

        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            mailbox,
            interval,
            cancelled,
            self.counters.clone(),
            self.reporter.clone(),
        ));

        self.cancel = Some(cancel);
        self.task = Some(task);
        self.state = EventLoopState::Running;
        log::info!("Event loop started ({:?} interval)", interval);
        Ok(())
    }

    /// Cancel the loop and wait for its task to exit.
    ///
    /// Once this returns no further tick will run. A no-op when idle or
    /// already stopped.
    pub async fn stop(&mut self) -> std::result::Result<(), ShutdownError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        self.state = EventLoopState::Stopping;
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }

        let joined = task.await;
        self.state = EventLoopState::Stopped;

        let stats = self.stats();
        log::info!(
            "Event loop stopped after {} tick(s), {} failure(s)",
            stats.ticks,
            stats.failures
        );

        joined.map_err(|e| ShutdownError::TaskFailed {
            task: "event loop",
            reason: e.to_string(),
        })
    }

    /// Tick counters
    pub fn stats(&self) -> EventLoopStats {
        EventLoopStats {
            ticks: self.counters.ticks.load(Ordering::SeqCst),
            failures: self.counters.failures.load(Ordering::SeqCst),
            last_tick_at: *self
                .counters
                .last_tick_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl Drop for EventLoopController {
    fn drop(&mut self) {
        // The task exits on its own; its mailbox clone goes with it.
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
    }
}

async fn run_loop(
    mailbox: EngineMailbox,
    period: Duration,
    mut cancelled: watch::Receiver<bool>,
    counters: Arc<LoopCounters>,
    reporter: Arc<dyn TickReporter>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = cancelled.changed() => {
                if changed.is_err() || *cancelled.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if *cancelled.borrow() {
            break;
        }

        let tick = counters.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let result = mailbox.tick().await;
        *counters
            .last_tick_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        match result {
            Ok(()) => log::trace!("Tick {} complete", tick),
            Err(EngineError::Destroyed) => {
                log::warn!("Engine destroyed under a running event loop");
                break;
            }
            Err(source @ EngineError::Fatal { .. }) => {
                counters.failures.fetch_add(1, Ordering::SeqCst);
                let error = TickError { tick, source };
                reporter.report(&error);
                log::error!("Event loop terminated: {}", error);
                break;
            }
            Err(source) => {
                counters.failures.fetch_add(1, Ordering::SeqCst);
                reporter.report(&TickError { tick, source });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{spawn_engine_actor, LoopbackEngine};
    use crate::utils::EngineConfig;
    use crate::engine::Engine;

    async fn loopback_mailbox() -> (EngineMailbox, JoinHandle<()>) {
        spawn_engine_actor(
            EngineConfig::default(),
            8,
            LoopbackEngine::create,
            Box::new(|_, _| {}),
        )
        .await
        .unwrap()
    }

    fn controller() -> EventLoopController {
        EventLoopController::new(Arc::new(LogReporter))
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut event_loop = controller();
        event_loop.stop().await.unwrap();
        assert_eq!(event_loop.state(), EventLoopState::Idle);
        assert_eq!(event_loop.stats().ticks, 0);
    }

    #[tokio::test]
    async fn test_start_stop_transitions() {
        let (mailbox, actor) = loopback_mailbox().await;
        let mut event_loop = controller();

        event_loop.start(mailbox.clone(), Duration::from_millis(5)).unwrap();
        assert_eq!(event_loop.state(), EventLoopState::Running);

        // Second start while running does not spawn another task.
        event_loop.start(mailbox.clone(), Duration::from_millis(5)).unwrap();

        time::sleep(Duration::from_millis(30)).await;
        event_loop.stop().await.unwrap();
        assert_eq!(event_loop.state(), EventLoopState::Stopped);

        let frozen = event_loop.stats();
        assert!(frozen.ticks > 0);
        assert!(frozen.last_tick_at.is_some());

        event_loop.stop().await.unwrap();
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(event_loop.stats(), frozen);

        assert!(matches!(
            event_loop.start(mailbox.clone(), Duration::from_millis(5)),
            Err(ClientError::InvalidState { .. })
        ));

        mailbox.destroy().await;
        actor.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (mailbox, _actor) = loopback_mailbox().await;
        let mut event_loop = controller();
        assert!(event_loop.start(mailbox, Duration::ZERO).is_err());
        assert_eq!(event_loop.state(), EventLoopState::Idle);
    }

    #[tokio::test]
    async fn test_loop_ends_when_engine_destroyed() {
        let (mailbox, actor) = loopback_mailbox().await;
        let mut event_loop = controller();
        event_loop.start(mailbox.clone(), Duration::from_millis(5)).unwrap();

        mailbox.destroy().await;
        actor.await.unwrap();
        time::sleep(Duration::from_millis(30)).await;

        assert_eq!(event_loop.state(), EventLoopState::Stopped);
        event_loop.stop().await.unwrap();
    }
}
