//! Shared fixtures: a scriptable engine whose every call is recorded.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tox_client::utils::{ClientConfig, EngineConfig, EngineError, TickError};
use tox_client::{BootstrapTarget, Client, Engine, MessageCallback, MessageId, PeerId, TickReporter};

/// What the stub engine saw, shared with the test body
#[derive(Default)]
pub struct Probe {
    pub bootstrap_attempts: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(PeerId, String)>>,
    pub ticks: AtomicU64,
    pub overlaps: AtomicU64,
    pub destroy_calls: AtomicU64,
    pub last_tick_end: Mutex<Option<Instant>>,
    pub destroyed_at: Mutex<Option<Instant>>,
    in_tick: AtomicBool,
    inbound: Mutex<VecDeque<(PeerId, String)>>,
    tick_errors: Mutex<VecDeque<EngineError>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue an incoming message; the engine emits it on its next tick
    pub fn emit(&self, peer_id: PeerId, text: &str) {
        self.inbound.lock().unwrap().push_back((peer_id, text.to_string()));
    }

    /// Make the next tick fail with `error`
    pub fn fail_next_tick(&self, error: EngineError) {
        self.tick_errors.lock().unwrap().push_back(error);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> u64 {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

/// Engine that records calls into a [`Probe`]
pub struct StubEngine {
    probe: Arc<Probe>,
    unreachable: HashSet<String>,
    tick_delay: Duration,
    callback: Option<MessageCallback>,
    next_message_id: MessageId,
}

impl StubEngine {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            probe,
            unreachable: HashSet::new(),
            tick_delay: Duration::ZERO,
            callback: None,
            next_message_id: 1,
        }
    }

    /// Bootstrap against `address` fails
    pub fn unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_string());
        self
    }

    /// Every tick blocks for `delay`
    pub fn slow_ticks(mut self, delay: Duration) -> Self {
        self.tick_delay = delay;
        self
    }
}

impl Engine for StubEngine {
    fn create(_config: &EngineConfig) -> Result<Self, EngineError> {
        Ok(Self::new(Probe::new()))
    }

    fn bootstrap(&mut self, address: &str, _port: u16, _public_key: &str) -> Result<(), EngineError> {
        self.probe
            .bootstrap_attempts
            .lock()
            .unwrap()
            .push(address.to_string());
        if self.unreachable.contains(address) {
            return Err(EngineError::BadHost {
                address: address.to_string(),
            });
        }
        Ok(())
    }

    fn send_message(&mut self, peer_id: PeerId, text: &str) -> Result<MessageId, EngineError> {
        self.probe.sent.lock().unwrap().push((peer_id, text.to_string()));
        let id = self.next_message_id;
        self.next_message_id += 1;
        Ok(id)
    }

    fn set_message_callback(&mut self, callback: MessageCallback) {
        self.callback = Some(callback);
    }

    fn iterate(&mut self) -> Result<(), EngineError> {
        if self.probe.in_tick.swap(true, Ordering::SeqCst) {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.probe.ticks.fetch_add(1, Ordering::SeqCst);

        if !self.tick_delay.is_zero() {
            std::thread::sleep(self.tick_delay);
        }

        let inbound: Vec<_> = self.probe.inbound.lock().unwrap().drain(..).collect();
        if let Some(callback) = self.callback.as_mut() {
            for (peer_id, text) in inbound {
                callback(peer_id, &text);
            }
        }

        let scripted = self.probe.tick_errors.lock().unwrap().pop_front();
        *self.probe.last_tick_end.lock().unwrap() = Some(Instant::now());
        self.probe.in_tick.store(false, Ordering::SeqCst);

        match scripted {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn destroy(&mut self) {
        self.probe.destroy_calls.fetch_add(1, Ordering::SeqCst);
        *self.probe.destroyed_at.lock().unwrap() = Some(Instant::now());
        self.callback = None;
    }
}

/// Collects reported tick failures
#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<TickError>>,
}

impl TickReporter for RecordingReporter {
    fn report(&self, error: &TickError) {
        self.reports.lock().unwrap().push(error.clone());
    }
}

pub fn target(address: &str) -> BootstrapTarget {
    BootstrapTarget::new(address, 33445, "AB".repeat(32))
}

/// Client over a fresh stub engine
pub async fn stub_client() -> (Client, Arc<Probe>) {
    let probe = Probe::new();
    let engine_probe = probe.clone();
    let client = Client::with_factory(ClientConfig::default(), move |_: &EngineConfig| {
        Ok(StubEngine::new(engine_probe))
    })
    .await
    .unwrap();
    (client, probe)
}

/// Poll `condition` until it holds or `limit` elapses
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
