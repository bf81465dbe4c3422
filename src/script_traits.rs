//! Defines the script contract and the context injected into every script.

use std::fmt;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::error::{Dependency, LedgerError, RegistrationError, ScriptError};
use crate::primitives::{Command, KeyPair, OutgoingTransaction};
use crate::types::InterestSet;

/// Outbound access to the ledger.
///
/// Transport and signing live behind this trait; the host supplies the
/// implementation.
pub trait LedgerApi: Send + Sync {
    /// Signs `tx` with `key_pair` and submits it.
    fn submit(&self, tx: &OutgoingTransaction, key_pair: &KeyPair) -> Result<(), LedgerError>;
}

/// A business-logic unit driven by the ledger's command stream.
///
/// Scripts do not hold their dependencies; they receive them through the
/// [`ScriptContext`] on every call, and the dispatcher guarantees the context
/// is complete before the first `process` call.
pub trait Script: Send + Sync + 'static {
    /// The command kinds this script wants. Called exactly once, at
    /// registration; the result is fixed for the script's lifetime.
    fn declare_interest(&self) -> InterestSet;

    /// Handles one matching command. Calls arrive in ledger arrival order, one
    /// at a time. An `Err` (or a panic) is reported and the script keeps
    /// receiving later commands.
    fn process(&self, ctx: &ScriptContext, command: &Command, created_time: u64) -> Result<(), ScriptError>;

    /// Cleanup hook run once when an active script is retired, after its last
    /// delivery. Default: nothing.
    fn shutdown(&self, _ctx: &ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// Dependencies handed to an active script. Cheap to clone.
#[derive(Clone)]
pub struct ScriptContext {
    script_name: Arc<str>,
    ledger: Arc<dyn LedgerApi>,
    key_pair: Arc<KeyPair>,
    cache: Arc<dyn CacheManager>,
}

impl ScriptContext {
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn ledger(&self) -> &dyn LedgerApi {
        self.ledger.as_ref()
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn cache(&self) -> &dyn CacheManager {
        self.cache.as_ref()
    }

    /// Submits `tx` through the ledger handle, signed with this context's key pair.
    pub fn submit(&self, tx: &OutgoingTransaction) -> Result<(), ScriptError> {
        tracing::debug!(
            script = %self.script_name,
            commands = tx.commands().len(),
            "Submitting transaction to ledger"
        );
        self.ledger.submit(tx, &self.key_pair).map_err(ScriptError::from)
    }
}

impl fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("script_name", &self.script_name)
            .field("public_key", &self.key_pair.public)
            .finish_non_exhaustive()
    }
}

/// The host-provided dependencies of one script, gathered before activation.
///
/// Any field may still be unset; [`ScriptDependencies::into_context`] is the
/// single point that checks all three are present.
#[derive(Clone, Default)]
pub struct ScriptDependencies {
    ledger: Option<Arc<dyn LedgerApi>>,
    key_pair: Option<Arc<KeyPair>>,
    cache: Option<Arc<dyn CacheManager>>,
}

impl ScriptDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerApi>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_key_pair(mut self, key_pair: Arc<KeyPair>) -> Self {
        self.key_pair = Some(key_pair);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// First dependency that is still unset, in ledger / key pair / cache order.
    pub fn missing(&self) -> Option<Dependency> {
        if self.ledger.is_none() {
            Some(Dependency::Ledger)
        } else if self.key_pair.is_none() {
            Some(Dependency::KeyPair)
        } else if self.cache.is_none() {
            Some(Dependency::CacheManager)
        } else {
            None
        }
    }

    pub(crate) fn into_context(self, script_name: &str) -> Result<ScriptContext, RegistrationError> {
        match (self.ledger, self.key_pair, self.cache) {
            (Some(ledger), Some(key_pair), Some(cache)) => Ok(ScriptContext {
                script_name: Arc::from(script_name),
                ledger,
                key_pair,
                cache,
            }),
            (None, _, _) => Err(RegistrationError::MissingDependency(Dependency::Ledger)),
            (_, None, _) => Err(RegistrationError::MissingDependency(Dependency::KeyPair)),
            (_, _, None) => Err(RegistrationError::MissingDependency(Dependency::CacheManager)),
        }
    }
}

impl fmt::Debug for ScriptDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptDependencies")
            .field("ledger", &self.ledger.is_some())
            .field("key_pair", &self.key_pair.is_some())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ShardedCache;
    use crate::primitives::{PublicKeyBytes, SecretKeyBytes};

    struct NullLedger;

    impl LedgerApi for NullLedger {
        fn submit(&self, _tx: &OutgoingTransaction, _key_pair: &KeyPair) -> Result<(), LedgerError> {
            Err(LedgerError::Transport("offline".into()))
        }
    }

    fn key_pair() -> Arc<KeyPair> {
        Arc::new(KeyPair::new(PublicKeyBytes([2u8; 32]), SecretKeyBytes([3u8; 64])))
    }

    #[test]
    fn missing_reports_first_unset_dependency() {
        let deps = ScriptDependencies::new();
        assert_eq!(deps.missing(), Some(Dependency::Ledger));

        let deps = deps.with_ledger(Arc::new(NullLedger));
        assert_eq!(deps.missing(), Some(Dependency::KeyPair));

        let deps = deps.with_key_pair(key_pair());
        assert_eq!(deps.missing(), Some(Dependency::CacheManager));

        let deps = deps.with_cache(Arc::new(ShardedCache::new()));
        assert_eq!(deps.missing(), None);
        assert!(deps.into_context("s").is_ok());
    }

    #[test]
    fn into_context_rejects_incomplete_dependencies() {
        let err = ScriptDependencies::new()
            .with_ledger(Arc::new(NullLedger))
            .with_cache(Arc::new(ShardedCache::new()))
            .into_context("s")
            .unwrap_err();
        assert_eq!(err, RegistrationError::MissingDependency(Dependency::KeyPair));
    }

    #[test]
    fn submit_maps_ledger_errors() {
        let ctx = ScriptDependencies::new()
            .with_ledger(Arc::new(NullLedger))
            .with_key_pair(key_pair())
            .with_cache(Arc::new(ShardedCache::new()))
            .into_context("submitter")
            .unwrap();
        let tx = OutgoingTransaction::new("dapp@test", 1);
        assert_eq!(
            ctx.submit(&tx).unwrap_err(),
            ScriptError::Ledger(LedgerError::Transport("offline".into()))
        );
        assert_eq!(ctx.script_name(), "submitter");
    }
}
