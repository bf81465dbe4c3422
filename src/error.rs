//!
//! Defines error types for the dApp script host.

use std::fmt;

use crate::dispatcher::{ScriptId, ScriptState};

/// A dependency a script needs before it can be activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Ledger,
    KeyPair,
    CacheManager,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Ledger => f.write_str("ledger handle"),
            Dependency::KeyPair => f.write_str("key pair"),
            Dependency::CacheManager => f.write_str("cache manager"),
        }
    }
}

/// Errors raised while registering, activating or retiring a script.
/// They only ever concern the script named in the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Activation was attempted with a dependency unset.
    #[error("Cannot activate script: {0} is not set")]
    MissingDependency(Dependency),
    /// A script with this name is already registered.
    #[error("Script already registered: {0}")]
    DuplicateScript(String),
    /// No script with this id.
    #[error("Unknown script id {0}")]
    UnknownScript(ScriptId),
    /// The requested lifecycle step is not valid from the current state.
    #[error("Script {script} cannot move from {from:?} to {to:?}")]
    InvalidTransition { script: String, from: ScriptState, to: ScriptState },
    /// Activation needs a Tokio runtime to spawn the script's worker.
    #[error("No Tokio runtime available to spawn the script worker")]
    NoRuntime,
}

/// Failure of a single delivery: a `process` (or `shutdown`) invocation, or an
/// enqueue refused by a full queue. It never reaches other scripts or the intake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("Script failed: {0}")]
    Failed(String),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    /// The invocation panicked; the panic was contained by the worker.
    #[error("Script panicked: {0}")]
    Panicked(String),
    /// The command was not enqueued: the script's queue was full.
    #[error("Script queue full ({capacity} commands), command dropped")]
    QueueFull { capacity: usize },
}

impl ScriptError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ScriptError::Failed(msg.into())
    }
}

/// Structural failures of a cache backend. A missing key is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend failure: {0}")]
    Backend(String),
    /// The stored value is not of the type the caller asked for.
    #[error("Cached value under key {key:?} has a different type")]
    TypeMismatch { key: String },
}

/// Errors returned by the outbound ledger collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Transaction rejected by ledger: {0}")]
    Rejected(String),
    #[error("Ledger transport failure: {0}")]
    Transport(String),
}

/// A code or name outside the command-kind catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Unknown command code: {0}")]
    UnknownCode(u32),
    #[error("Unknown command kind: {0}")]
    UnknownName(String),
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid { var: &'static str, value: String, reason: String },
}
