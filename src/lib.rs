#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(deprecated)]

//!
//! dapp-core is the control plane for ledger-driven dApp scripts.
//!
//! Scripts declare which ledger command kinds they care about; the
//! [`Dispatcher`] consumes the ledger's ordered command stream and delivers each
//! command to every interested script, in arrival order, through a bounded
//! per-script queue. Scripts share a concurrent key-value [`cache`] and reach
//! back to the ledger through an injected [`script_traits::LedgerApi`].

// The command-kind catalog and interest sets.
pub mod types;

// Commands, blocks, transactions and keys as the dispatcher sees them.
pub mod primitives;

pub mod error;

pub mod cache;

// The script contract and the context injected into scripts.
pub mod script_traits;

pub mod config;

pub mod dispatcher;

#[cfg(feature = "tracing-subscriber")]
pub mod logging;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{CacheManager, CacheManagerExt, CacheValue, ShardedCache};
pub use config::{DispatcherConfig, RetirePolicy};
pub use dispatcher::{BlockSummary, Dispatcher, RetireReport, ScriptFailure, ScriptId, ScriptState, ScriptStats};
pub use primitives::{Block, Command, CommandBody, KeyPair, RawCommand, Transaction};
pub use script_traits::{LedgerApi, Script, ScriptContext, ScriptDependencies};
pub use types::{CommandKind, InterestSet};
