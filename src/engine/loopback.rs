//! In-process engine used by the binary and the tests.
//!
//! The loopback engine speaks no network protocol. It validates bootstrap
//! targets syntactically, treats itself as connected after the first accepted
//! target, and echoes every accepted message back through the message
//! callback on the following tick.

use crate::engine::{Engine, MessageCallback, MessageId, PeerId};
use crate::utils::{EngineConfig, EngineError};
use std::collections::{HashSet, VecDeque};

/// Friend number the engine assigns to itself
pub const SELF_PEER: PeerId = 0;

/// Longest accepted message, in bytes
pub const MAX_MESSAGE_LENGTH: usize = 1372;

/// Length of a hex-encoded public key
pub const PUBLIC_KEY_HEX_LEN: usize = 64;

/// Engine that loops messages back to the sender
pub struct LoopbackEngine {
    friends: HashSet<PeerId>,
    connected: bool,
    next_message_id: MessageId,
    pending: VecDeque<(PeerId, String)>,
    callback: Option<MessageCallback>,
}

impl LoopbackEngine {
    /// Create an engine that knows the given friends in addition to itself
    pub fn with_friends(
        config: &EngineConfig,
        friends: impl IntoIterator<Item = PeerId>,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::create(config)?;
        engine.friends.extend(friends);
        Ok(engine)
    }

    /// Friend numbers stored in a save-state blob: little-endian `u32`s
    fn friends_from_save_data(blob: &[u8]) -> Result<HashSet<PeerId>, EngineError> {
        if blob.len() % 4 != 0 {
            return Err(EngineError::InvalidOption {
                option: "save_data".to_string(),
                reason: format!("length {} is not a multiple of 4", blob.len()),
            });
        }
        Ok(blob
            .chunks_exact(4)
            .map(|chunk| PeerId::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    /// True once a bootstrap target has been accepted
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Engine for LoopbackEngine {
    fn create(config: &EngineConfig) -> Result<Self, EngineError> {
        if config.start_port > config.end_port {
            return Err(EngineError::InvalidOption {
                option: "port_range".to_string(),
                reason: format!("{} > {}", config.start_port, config.end_port),
            });
        }

        let mut friends = match &config.save_data {
            Some(blob) => Self::friends_from_save_data(blob)?,
            None => HashSet::new(),
        };
        friends.insert(SELF_PEER);

        Ok(Self {
            friends,
            connected: false,
            next_message_id: 1,
            pending: VecDeque::new(),
            callback: None,
        })
    }

    fn bootstrap(&mut self, address: &str, port: u16, public_key: &str) -> Result<(), EngineError> {
        if address.trim().is_empty() {
            return Err(EngineError::BadHost {
                address: address.to_string(),
            });
        }
        if port == 0 {
            return Err(EngineError::BadPort { port });
        }
        if public_key.len() != PUBLIC_KEY_HEX_LEN {
            return Err(EngineError::BadPublicKey {
                reason: format!(
                    "expected {PUBLIC_KEY_HEX_LEN} hex digits, got {}",
                    public_key.len()
                ),
            });
        }
        hex::decode(public_key).map_err(|e| EngineError::BadPublicKey {
            reason: e.to_string(),
        })?;

        self.connected = true;
        Ok(())
    }

    fn send_message(&mut self, peer_id: PeerId, text: &str) -> Result<MessageId, EngineError> {
        if !self.friends.contains(&peer_id) {
            return Err(EngineError::FriendNotFound { peer_id });
        }
        if !self.connected {
            return Err(EngineError::NotConnected { peer_id });
        }
        if text.is_empty() {
            return Err(EngineError::MessageEmpty);
        }
        if text.len() > MAX_MESSAGE_LENGTH {
            return Err(EngineError::MessageTooLong {
                size: text.len(),
                max: MAX_MESSAGE_LENGTH,
            });
        }

        let message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        self.pending.push_back((peer_id, text.to_string()));
        Ok(message_id)
    }

    fn set_message_callback(&mut self, callback: MessageCallback) {
        self.callback = Some(callback);
    }

    fn iterate(&mut self) -> Result<(), EngineError> {
        while let Some((peer_id, text)) = self.pending.pop_front() {
            if let Some(callback) = self.callback.as_mut() {
                callback(peer_id, &text);
            }
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.pending.clear();
        self.callback = None;
        self.connected = false;
    }
}
