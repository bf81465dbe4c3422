//! Per-script delivery worker.
//!
//! Every active script owns one bounded queue and one Tokio task draining it.
//! The task hands each command to the script on the blocking pool, so a slow
//! or blocking script only holds up its own queue, and a panic inside
//! `process` is contained to that single invocation.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::RetirePolicy;
use crate::error::ScriptError;
use crate::primitives::Command;
use crate::script_traits::{Script, ScriptContext};
use crate::types::CommandKind;

/// A failed `process` invocation, as published to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub script: String,
    pub kind: CommandKind,
    pub created_time: u64,
    pub error: ScriptError,
}

/// Delivery counters shared between a worker and the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    pub(crate) delivered: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) overflowed: AtomicU64,
}

/// Point-in-time copy of [`DeliveryCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CounterSnapshot {
    pub(crate) delivered: u64,
    pub(crate) failed: u64,
    pub(crate) discarded: u64,
    pub(crate) overflowed: u64,
}

impl DeliveryCounters {
    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            delivered: self.delivered.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            discarded: self.discarded.load(Ordering::Acquire),
            overflowed: self.overflowed.load(Ordering::Acquire),
        }
    }
}

/// Everything a worker task needs to drive one script.
pub(crate) struct ScriptWorker {
    pub(crate) name: Arc<str>,
    pub(crate) script: Arc<dyn Script>,
    pub(crate) ctx: ScriptContext,
    pub(crate) policy: RetirePolicy,
    pub(crate) counters: Arc<DeliveryCounters>,
    pub(crate) failures: broadcast::Sender<ScriptFailure>,
}

/// Dispatcher-side handle to a running worker.
pub(crate) struct WorkerHandle {
    tx: mpsc::Sender<Arc<Command>>,
    retire: CancellationToken,
    join: JoinHandle<()>,
}

/// How a worker ended when asked to stop.
#[derive(Debug)]
pub(crate) enum StopOutcome {
    Stopped,
    /// Still busy when the timeout ran out; it finishes in the background.
    Detached,
    Crashed(JoinError),
}

impl WorkerHandle {
    /// Spawns `worker` on `runtime` behind a queue of `capacity` commands.
    pub(crate) fn spawn(runtime: &Handle, worker: ScriptWorker, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let retire = CancellationToken::new();
        let join = runtime.spawn(worker.run(rx, retire.clone()));
        WorkerHandle { tx, retire, join }
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<Arc<Command>> {
        self.tx.clone()
    }

    /// Fires when the script starts retiring. Pending enqueues race it.
    pub(crate) fn retire_token(&self) -> CancellationToken {
        self.retire.clone()
    }

    /// Commands currently waiting in the queue.
    pub(crate) fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Signals retirement. The worker closes its queue, so this works even
    /// while an enqueue still holds a sender clone.
    pub(crate) fn begin_retire(&self) {
        self.retire.cancel();
    }

    /// Waits up to `timeout` for the worker to drain or discard its queue and
    /// run the shutdown hook.
    pub(crate) async fn stop(self, timeout: Duration) -> StopOutcome {
        let WorkerHandle { tx, retire, join } = self;
        retire.cancel();
        drop(tx);
        match tokio::time::timeout(timeout, join).await {
            Ok(Ok(())) => StopOutcome::Stopped,
            Ok(Err(e)) => StopOutcome::Crashed(e),
            // Dropping the handle detaches the task.
            Err(_) => StopOutcome::Detached,
        }
    }
}

impl ScriptWorker {
    /// Delivers queued commands until retirement is signalled, then drains or
    /// discards what is left per the retire policy and runs the shutdown hook.
    async fn run(self, mut rx: mpsc::Receiver<Arc<Command>>, retire: CancellationToken) {
        tracing::debug!(script = %self.name, "Script worker started");

        loop {
            tokio::select! {
                // Check for retirement before taking the next command.
                biased;

                _ = retire.cancelled() => break,
                next = rx.recv() => {
                    match next {
                        Some(command) => self.deliver(command).await,
                        None => break,
                    }
                }
            }
        }

        // No enqueue can succeed past this point.
        rx.close();
        match self.policy {
            RetirePolicy::Drain => {
                while let Some(command) = rx.recv().await {
                    self.deliver(command).await;
                }
            }
            RetirePolicy::Discard => self.discard_remaining(&mut rx).await,
        }

        self.run_shutdown_hook().await;
        tracing::debug!(script = %self.name, "Script worker stopped");
    }

    async fn deliver(&self, command: Arc<Command>) {
        let script = Arc::clone(&self.script);
        let ctx = self.ctx.clone();
        let cmd = Arc::clone(&command);

        let outcome = tokio::task::spawn_blocking(move || script.process(&ctx, &cmd, cmd.created_time)).await;
        let result = outcome.unwrap_or_else(|e| Err(join_error_to_script_error(e)));

        match result {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::AcqRel);
                tracing::trace!(
                    script = %self.name,
                    kind = %command.kind,
                    created_time = command.created_time,
                    "Command processed"
                );
            }
            Err(error) => {
                self.counters.failed.fetch_add(1, Ordering::AcqRel);
                tracing::error!(
                    script = %self.name,
                    kind = %command.kind,
                    created_time = command.created_time,
                    error = %error,
                    "Script failed to process command"
                );
                // Zero subscribers is fine.
                let _ = self.failures.send(ScriptFailure {
                    script: self.name.to_string(),
                    kind: command.kind,
                    created_time: command.created_time,
                    error,
                });
            }
        }
    }

    // The queue is closed: `recv` ends once the buffer is empty.
    async fn discard_remaining(&self, rx: &mut mpsc::Receiver<Arc<Command>>) {
        let mut dropped = 0u64;
        while rx.recv().await.is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            self.counters.discarded.fetch_add(dropped, Ordering::AcqRel);
            tracing::warn!(script = %self.name, dropped, "Discarded queued commands on retirement");
        }
    }

    async fn run_shutdown_hook(&self) {
        let script = Arc::clone(&self.script);
        let ctx = self.ctx.clone();
        let outcome = tokio::task::spawn_blocking(move || script.shutdown(&ctx)).await;
        if let Err(error) = outcome.unwrap_or_else(|e| Err(join_error_to_script_error(e))) {
            tracing::error!(script = %self.name, error = %error, "Script shutdown hook failed");
        }
    }
}

fn join_error_to_script_error(err: JoinError) -> ScriptError {
    if err.is_panic() {
        ScriptError::Panicked(panic_message(err.into_panic()))
    } else {
        ScriptError::Failed("invocation cancelled".into())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
