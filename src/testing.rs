//! Mock scripts and collaborators for tests and benchmarks.
//!
//! Compiled for this crate's own tests and, for downstream crates, behind the
//! `test-utils` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cache::{CacheManager, CacheManagerExt, ShardedCache};
use crate::error::{LedgerError, ScriptError};
use crate::primitives::{Command, KeyPair, OutgoingTransaction, PublicKeyBytes, SecretKeyBytes};
use crate::script_traits::{LedgerApi, Script, ScriptContext, ScriptDependencies};
use crate::types::InterestSet;

pub fn test_key_pair() -> Arc<KeyPair> {
    Arc::new(KeyPair::new(PublicKeyBytes([1u8; 32]), SecretKeyBytes([9u8; 64])))
}

/// Ledger handle that records every submitted transaction.
#[derive(Default)]
pub struct RecordingLedger {
    submitted: Mutex<Vec<OutgoingTransaction>>,
    reject_with: Option<LedgerError>,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger that refuses every submission with `err`.
    pub fn rejecting(err: LedgerError) -> Self {
        RecordingLedger { submitted: Mutex::new(Vec::new()), reject_with: Some(err) }
    }

    pub fn submitted(&self) -> Vec<OutgoingTransaction> {
        self.submitted.lock().clone()
    }
}

impl LedgerApi for RecordingLedger {
    fn submit(&self, tx: &OutgoingTransaction, _key_pair: &KeyPair) -> Result<(), LedgerError> {
        if let Some(err) = &self.reject_with {
            return Err(err.clone());
        }
        self.submitted.lock().push(tx.clone());
        Ok(())
    }
}

/// Dependencies with a recording ledger, the test key pair and `cache`.
pub fn dependencies_with(cache: Arc<dyn CacheManager>) -> ScriptDependencies {
    ScriptDependencies::new()
        .with_ledger(Arc::new(RecordingLedger::new()))
        .with_key_pair(test_key_pair())
        .with_cache(cache)
}

/// Dependencies with a fresh private cache.
pub fn full_dependencies() -> ScriptDependencies {
    dependencies_with(Arc::new(ShardedCache::new()))
}

/// Script that records every command it is handed, in call order.
///
/// It can be told to fail or panic on specific payloads and to sleep before
/// each call.
pub struct RecordingScript {
    interest: InterestSet,
    seen: Mutex<Vec<Command>>,
    fail_on: Option<Vec<u8>>,
    panic_on: Option<Vec<u8>>,
    delay: Option<Duration>,
    declare_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
}

impl RecordingScript {
    pub fn new(interest: impl Into<InterestSet>) -> Self {
        RecordingScript {
            interest: interest.into(),
            seen: Mutex::new(Vec::new()),
            fail_on: None,
            panic_on: None,
            delay: None,
            declare_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }

    /// Return an error for commands carrying exactly `payload`.
    pub fn fail_on_payload(mut self, payload: &[u8]) -> Self {
        self.fail_on = Some(payload.to_vec());
        self
    }

    /// Panic for commands carrying exactly `payload`.
    pub fn panic_on_payload(mut self, payload: &[u8]) -> Self {
        self.panic_on = Some(payload.to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every command handed to `process`, including failed ones.
    pub fn received(&self) -> Vec<Command> {
        self.seen.lock().clone()
    }

    pub fn declare_calls(&self) -> usize {
        self.declare_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

impl Script for RecordingScript {
    fn declare_interest(&self) -> InterestSet {
        self.declare_calls.fetch_add(1, Ordering::SeqCst);
        self.interest
    }

    fn process(&self, _ctx: &ScriptContext, command: &Command, _created_time: u64) -> Result<(), ScriptError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.seen.lock().push(command.clone());

        if self.panic_on.as_deref() == Some(command.payload.as_slice()) {
            panic!("scripted panic on {}", command.kind);
        }
        if self.fail_on.as_deref() == Some(command.payload.as_slice()) {
            return Err(ScriptError::failed(format!("scripted failure on {}", command.kind)));
        }
        Ok(())
    }

    fn shutdown(&self, _ctx: &ScriptContext) -> Result<(), ScriptError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Script whose `process` blocks until [`GatedScript::release`] is called.
pub struct GatedScript {
    interest: InterestSet,
    open: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
    shutdown_calls: AtomicUsize,
}

impl GatedScript {
    pub fn new(interest: impl Into<InterestSet>) -> Self {
        GatedScript {
            interest: interest.into(),
            open: Mutex::new(false),
            opened: Condvar::new(),
            entered: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }

    /// Lets every blocked and future `process` call return.
    pub fn release(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Number of `process` calls started so far.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

impl Script for GatedScript {
    fn declare_interest(&self) -> InterestSet {
        self.interest
    }

    fn process(&self, _ctx: &ScriptContext, _command: &Command, _created_time: u64) -> Result<(), ScriptError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        Ok(())
    }

    fn shutdown(&self, _ctx: &ScriptContext) -> Result<(), ScriptError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Script that keeps a running count of its commands in the shared cache and
/// submits one transaction per command.
pub struct CacheCounterScript {
    interest: InterestSet,
    key: String,
}

impl CacheCounterScript {
    pub fn new(interest: impl Into<InterestSet>, key: &str) -> Self {
        CacheCounterScript { interest: interest.into(), key: key.to_string() }
    }
}

impl Script for CacheCounterScript {
    fn declare_interest(&self) -> InterestSet {
        self.interest
    }

    fn process(&self, ctx: &ScriptContext, command: &Command, created_time: u64) -> Result<(), ScriptError> {
        let current = ctx.cache().get_as::<u64>(&self.key)?.map_or(0, |n| *n);
        ctx.cache().put_value(&self.key, current + 1)?;
        ctx.submit(
            &OutgoingTransaction::new(ctx.script_name(), created_time).with_command(command.kind, command.payload.clone()),
        )
    }
}
