//! Joining the network through bootstrap nodes.
//!
//! Every target is attempted independently. Joining succeeds when at least
//! one target accepted the engine; a full failure returns every per-target
//! cause, attributed to the target's address.

use crate::engine::{Engine, EngineHandle};
use crate::utils::{BootstrapError, ConfigError, EngineError, TargetFailure};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A known network entry point
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootstrapTarget {
    /// Hostname or IP address
    pub address: String,
    /// UDP port
    pub port: u16,
    /// Hex-encoded long-term public key of the node
    pub public_key: String,
}

/// Result of attempting a single target
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    /// The attempted target
    pub target: BootstrapTarget,
    /// What the engine reported
    pub result: Result<(), EngineError>,
}

/// Per-target outcomes of one bootstrap round
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    outcomes: Vec<BootstrapOutcome>,
}

/// Attempts a set of targets against one engine
pub struct BootstrapCoordinator<'a> {
    targets: &'a [BootstrapTarget],
}

impl BootstrapTarget {
    /// Create a new bootstrap target
    pub fn new(address: impl Into<String>, port: u16, public_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            public_key: public_key.into(),
        }
    }
}

impl fmt::Display for BootstrapTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Parses `address:port:public_key`. IPv6 addresses may be bracketed.
impl FromStr for BootstrapTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidValue {
            field: "bootstrap target".to_string(),
            value: s.to_string(),
        };

        let mut parts = s.rsplitn(3, ':');
        let public_key = parts.next().filter(|k| !k.is_empty()).ok_or_else(invalid)?;
        let port = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(invalid)?;
        let address = parts
            .next()
            .map(|a| a.trim_start_matches('[').trim_end_matches(']'))
            .filter(|a| !a.is_empty())
            .ok_or_else(invalid)?;

        Ok(Self::new(address, port, public_key))
    }
}

impl BootstrapReport {
    /// Every outcome, in attempt order
    pub fn outcomes(&self) -> &[BootstrapOutcome] {
        &self.outcomes
    }

    /// Number of targets that accepted the engine
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of targets that failed
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// True if at least one target succeeded
    pub fn is_joined(&self) -> bool {
        self.succeeded() > 0
    }

    /// Per-target failures annotated with their address
    pub fn failures(&self) -> impl Iterator<Item = TargetFailure> + '_ {
        self.outcomes.iter().filter_map(|outcome| {
            outcome.result.as_ref().err().map(|source| TargetFailure {
                address: outcome.target.address.clone(),
                port: outcome.target.port,
                source: source.clone(),
            })
        })
    }

    /// Collapse into the minimal contract: success iff any target succeeded.
    ///
    /// Partial failures are dropped on success.
    pub fn into_result(self) -> Result<(), BootstrapError> {
        if self.is_joined() {
            Ok(())
        } else {
            Err(BootstrapError {
                failures: self.failures().collect(),
            })
        }
    }
}

impl<'a> BootstrapCoordinator<'a> {
    /// Create a coordinator for the given targets
    pub fn new(targets: &'a [BootstrapTarget]) -> Self {
        Self { targets }
    }

    /// Attempt every target; a failing target never stops the others
    pub fn run<E: Engine>(&self, handle: &mut EngineHandle<E>) -> BootstrapReport {
        let outcomes: Vec<BootstrapOutcome> = self
            .targets
            .iter()
            .map(|target| {
                let result = handle.bootstrap(target);
                match &result {
                    Ok(()) => log::debug!("Bootstrapped with {}", target),
                    Err(e) => log::debug!("Bootstrap with {} failed: {}", target, e),
                }
                BootstrapOutcome {
                    target: target.clone(),
                    result,
                }
            })
            .collect();

        let report = BootstrapReport { outcomes };
        log::info!(
            "Bootstrap finished: {}/{} target(s) succeeded",
            report.succeeded(),
            report.outcomes.len()
        );
        report
    }
}
