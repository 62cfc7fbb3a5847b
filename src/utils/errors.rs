//! Error types and handling for the tox client.
//!
//! Engine-level failures are reported as [`EngineError`]. The lifecycle layer
//! wraps them in the error each operation promises: [`InitializationError`]
//! for construction, [`BootstrapError`] for network joining, [`SendError`] for
//! message submission and [`TickError`] for reported event-loop failures.

use crate::engine::PeerId;
use thiserror::Error;

/// Result type alias for the client library
pub type Result<T> = std::result::Result<T, ClientError>;

/// Top-level error for all client operations
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Configuration and I/O errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The engine could not be constructed
    #[error(transparent)]
    Initialization(#[from] InitializationError),

    /// Every bootstrap target failed
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// The engine rejected an outgoing message
    #[error(transparent)]
    Send(#[from] SendError),

    /// Engine failure outside of a more specific operation
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// A background task failed while tearing the client down
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    /// The client has been shut down and its engine destroyed
    #[error("Client is shut down")]
    Closed,

    /// Operation not permitted in the current lifecycle state
    #[error("Cannot {operation} while event loop is {state}")]
    InvalidState {
        /// Rejected operation
        operation: &'static str,
        /// State at the time of the call
        state: String,
    },

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

/// Failures reported by the engine capability surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Construction option rejected by the engine
    #[error("Invalid engine option {option}: {reason}")]
    InvalidOption { option: String, reason: String },

    /// Engine could not acquire its resources
    #[error("Engine unavailable: {reason}")]
    Unavailable { reason: String },

    /// Bootstrap host could not be used
    #[error("Bad bootstrap host: {address}")]
    BadHost { address: String },

    /// Bootstrap port could not be used
    #[error("Bad bootstrap port: {port}")]
    BadPort { port: u16 },

    /// Bootstrap public key is malformed
    #[error("Bad public key: {reason}")]
    BadPublicKey { reason: String },

    /// No friend with this number
    #[error("Friend {peer_id} not found")]
    FriendNotFound { peer_id: PeerId },

    /// Friend exists but is not online
    #[error("Friend {peer_id} is not connected")]
    NotConnected { peer_id: PeerId },

    /// Message text is empty
    #[error("Message is empty")]
    MessageEmpty,

    /// Message text exceeds the engine's limit
    #[error("Message too long: {size} bytes (max: {max})")]
    MessageTooLong { size: usize, max: usize },

    /// Recoverable failure during network processing
    #[error("Transient engine failure: {reason}")]
    Transient { reason: String },

    /// Unrecoverable failure; the event loop stops when a tick reports it
    #[error("Fatal engine failure: {reason}")]
    Fatal { reason: String },

    /// The engine handle has already been destroyed
    #[error("Engine handle destroyed")]
    Destroyed,
}

/// Engine construction failed
#[derive(Error, Debug, Clone)]
#[error("Failed to initialize engine: {source}")]
pub struct InitializationError {
    /// Cause reported by the engine
    #[source]
    pub source: EngineError,
}

/// A single bootstrap target that could not be used
#[derive(Error, Debug, Clone)]
#[error("failed to bootstrap with server {address}: {source}")]
pub struct TargetFailure {
    /// Address of the target
    pub address: String,
    /// Port of the target
    pub port: u16,
    /// Cause reported by the engine
    #[source]
    pub source: EngineError,
}

/// All bootstrap targets failed.
///
/// Holds one entry per attempted target. An empty list means no targets were
/// supplied.
#[derive(Error, Debug, Clone)]
#[error("{}", render_failures(.failures))]
pub struct BootstrapError {
    /// Every per-target failure, in attempt order
    pub failures: Vec<TargetFailure>,
}

/// The engine rejected a message
#[derive(Error, Debug, Clone)]
#[error("failed to send message to friend {peer_id}: {source}")]
pub struct SendError {
    /// Intended recipient
    pub peer_id: PeerId,
    /// Cause reported by the engine
    #[source]
    pub source: EngineError,
}

/// A tick failed; reported to observers, never propagated
#[derive(Error, Debug, Clone)]
#[error("tick {tick} failed: {source}")]
pub struct TickError {
    /// 1-based tick number within the loop's lifetime
    pub tick: u64,
    /// Cause reported by the engine
    #[source]
    pub source: EngineError,
}

/// Teardown failure
#[derive(Error, Debug, Clone)]
pub enum ShutdownError {
    /// A background task panicked or was aborted before it could be joined
    #[error("{task} task failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },
}

/// Configuration and setup errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing error
    #[error("Configuration parse error: {reason}")]
    ParseError { reason: String },

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn render_failures(failures: &[TargetFailure]) -> String {
    if failures.is_empty() {
        return "bootstrap failed: no targets supplied".to_string();
    }
    let causes: Vec<String> = failures.iter().map(ToString::to_string).collect();
    format!("bootstrap failed for all {} target(s): {}", failures.len(), causes.join("; "))
}

impl BootstrapError {
    /// Addresses of the failed targets, in attempt order
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.address.as_str())
    }

    /// True when no targets were supplied at all
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl From<EngineError> for InitializationError {
    fn from(source: EngineError) -> Self {
        Self { source }
    }
}

impl ClientError {
    /// Returns true if retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Bootstrap(_)
                | Self::Engine(EngineError::Transient { .. })
                | Self::Send(SendError {
                    source: EngineError::NotConnected { .. } | EngineError::Transient { .. },
                    ..
                })
        )
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ShutdownError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed {
            task: "background",
            reason: err.to_string(),
        }
    }
}
