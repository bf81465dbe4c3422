//!
//! Command dispatch: script registry, lifecycle, and the sequential intake
//! that routes each ledger command to the scripts interested in it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::{DispatcherConfig, OverflowPolicy};
use crate::dispatcher::worker::{DeliveryCounters, ScriptFailure, ScriptWorker, StopOutcome, WorkerHandle};
use crate::error::{RegistrationError, ScriptError};
use crate::primitives::{Block, Command, RawCommand};
use crate::script_traits::{Script, ScriptDependencies};
use crate::types::{CommandKind, InterestSet};

/// Buffer of the failure broadcast channel. Slow subscribers lag, they never
/// block a worker.
const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Identifier handed out at registration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u64);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a registered script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    /// Interest captured, dependencies not yet validated. Receives nothing.
    Registered,
    /// Receives every matching command.
    Active,
    /// Receives nothing, ever again.
    Retired,
}

/// Point-in-time view of one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStats {
    pub name: String,
    pub state: ScriptState,
    pub interest: InterestSet,
    pub delivered: u64,
    pub failed: u64,
    pub discarded: u64,
    /// Commands refused because the queue was full.
    pub overflowed: u64,
    pub queued: usize,
}

/// Outcome of retiring a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetireReport {
    pub id: ScriptId,
    pub name: String,
    pub delivered: u64,
    pub failed: u64,
    pub discarded: u64,
    pub overflowed: u64,
    /// `false` if the worker was still busy when `retire_timeout` ran out. It
    /// then finishes (and runs the shutdown hook) in the background.
    pub worker_stopped: bool,
}

/// What happened to one block at the intake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub height: u64,
    pub commands: usize,
    /// Commands whose code is not in the catalog; they were not dispatched.
    pub unknown: usize,
    /// Enqueued deliveries, summed over commands.
    pub deliveries: usize,
}

/// One script's queue as seen by an enqueue in progress.
struct Target {
    name: Arc<str>,
    tx: mpsc::Sender<Arc<Command>>,
    retire: CancellationToken,
    counters: Arc<DeliveryCounters>,
}

enum Offer {
    Enqueued,
    Full,
    Retiring,
}

struct ScriptSlot {
    id: ScriptId,
    name: Arc<str>,
    script: Arc<dyn Script>,
    interest: InterestSet,
    state: ScriptState,
    counters: Arc<DeliveryCounters>,
    worker: Option<WorkerHandle>,
}

/// Routes an ordered command stream to a closed set of scripts.
///
/// Intake (`dispatch*`) is sequential: concurrent callers are serialised, so
/// the order in which calls acquire the intake is the arrival order every
/// script observes. Delivery to different scripts is independent. With
/// [`OverflowPolicy::Drop`] intake never waits on a script; with
/// [`OverflowPolicy::Wait`] a full queue stalls intake until it has room or
/// its script is retired. Retirement never takes the intake.
pub struct Dispatcher {
    config: DispatcherConfig,
    slots: RwLock<Vec<ScriptSlot>>,
    intake: Mutex<()>,
    next_id: AtomicU64,
    failures: broadcast::Sender<ScriptFailure>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Dispatcher {
            config,
            slots: RwLock::new(Vec::new()),
            intake: Mutex::new(()),
            next_id: AtomicU64::new(1),
            failures,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Registers `script` under a unique `name` and snapshots its interest set.
    ///
    /// The script starts in [`ScriptState::Registered`] and receives nothing
    /// until [`Dispatcher::activate`] succeeds. A rejected script's `declare_interest` is never called.
    pub fn register(&self, name: &str, script: Arc<dyn Script>) -> Result<ScriptId, RegistrationError> {
        if self.script_id(name).is_some() {
            return Err(RegistrationError::DuplicateScript(name.to_string()));
        }
        // Script code runs outside the registry lock.
        let interest = script.declare_interest();

        let mut slots = self.slots.write();
        // Re-check: a concurrent register may have taken the name meanwhile.
        if slots.iter().any(|slot| &*slot.name == name) {
            return Err(RegistrationError::DuplicateScript(name.to_string()));
        }

        let id = ScriptId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if interest.is_empty() {
            tracing::warn!(script = name, "Script declared an empty interest set");
        }
        tracing::info!(script = name, id = %id, interest = %interest, "Registered script");

        slots.push(ScriptSlot {
            id,
            name: Arc::from(name),
            script,
            interest,
            state: ScriptState::Registered,
            counters: Arc::new(DeliveryCounters::default()),
            worker: None,
        });
        Ok(id)
    }

    /// Validates `deps` and moves the script to [`ScriptState::Active`],
    /// spawning its worker on the current Tokio runtime.
    ///
    /// On error the script is left as it was; other scripts are unaffected.
    pub fn activate(&self, id: ScriptId, deps: ScriptDependencies) -> Result<(), RegistrationError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RegistrationError::NoRuntime)?;

        let mut slots = self.slots.write();
        let slot = slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .ok_or(RegistrationError::UnknownScript(id))?;

        if slot.state != ScriptState::Registered {
            return Err(RegistrationError::InvalidTransition {
                script: slot.name.to_string(),
                from: slot.state,
                to: ScriptState::Active,
            });
        }

        let ctx = deps.into_context(&slot.name).map_err(|e| {
            tracing::warn!(script = %slot.name, error = %e, "Script activation rejected");
            e
        })?;

        let worker = ScriptWorker {
            name: Arc::clone(&slot.name),
            script: Arc::clone(&slot.script),
            ctx,
            policy: self.config.retire_policy,
            counters: Arc::clone(&slot.counters),
            failures: self.failures.clone(),
        };
        slot.worker = Some(WorkerHandle::spawn(&runtime, worker, self.config.queue_capacity));
        slot.state = ScriptState::Active;

        tracing::info!(script = %slot.name, id = %id, "Activated script");
        Ok(())
    }

    /// [`register`](Self::register) followed by [`activate`](Self::activate).
    /// If activation fails the script stays registered.
    pub fn register_and_activate(
        &self,
        name: &str,
        script: Arc<dyn Script>,
        deps: ScriptDependencies,
    ) -> Result<ScriptId, RegistrationError> {
        let id = self.register(name, script)?;
        self.activate(id, deps)?;
        Ok(id)
    }

    /// Routes one command. Returns how many scripts it was enqueued for.
    ///
    /// A full queue is handled per [`OverflowPolicy`].
    pub async fn dispatch(&self, command: Command) -> usize {
        let _intake = self.intake.lock().await;
        self.enqueue(command).await
    }

    /// Resolves and routes a raw ledger command. Unknown codes match no script.
    pub async fn dispatch_raw(&self, raw: RawCommand) -> usize {
        let _intake = self.intake.lock().await;
        self.enqueue_raw(raw).await
    }

    /// Routes every command of `block` in order, holding the intake for the
    /// whole block.
    pub async fn dispatch_block(&self, block: &Block) -> BlockSummary {
        let _intake = self.intake.lock().await;
        let mut summary = BlockSummary { height: block.height, ..BlockSummary::default() };

        for raw in block.raw_commands() {
            summary.commands += 1;
            if CommandKind::by_index(raw.code).is_none() {
                summary.unknown += 1;
            }
            summary.deliveries += self.enqueue_raw(raw).await;
        }

        tracing::debug!(
            height = summary.height,
            commands = summary.commands,
            unknown = summary.unknown,
            deliveries = summary.deliveries,
            "Block dispatched"
        );
        summary
    }

    async fn enqueue_raw(&self, raw: RawCommand) -> usize {
        let code = raw.code;
        match raw.resolve() {
            Some(command) => self.enqueue(command).await,
            None => {
                tracing::debug!(code, "Dropping command with unknown code");
                0
            }
        }
    }

    // Caller holds the intake lock.
    async fn enqueue(&self, command: Command) -> usize {
        let targets: Vec<Target> = {
            let slots = self.slots.read();
            slots
                .iter()
                .filter(|slot| slot.state == ScriptState::Active && slot.interest.contains(command.kind))
                .filter_map(|slot| {
                    slot.worker.as_ref().map(|w| Target {
                        name: Arc::clone(&slot.name),
                        tx: w.sender(),
                        retire: w.retire_token(),
                        counters: Arc::clone(&slot.counters),
                    })
                })
                .collect()
        };

        if targets.is_empty() {
            tracing::trace!(kind = %command.kind, "No script interested in command");
            return 0;
        }

        let command = Arc::new(command);
        let mut delivered = 0;
        for target in targets {
            tracing::debug!(script = %target.name, kind = %command.kind, "Appending command to script queue");
            match self.offer(&target, &command).await {
                Offer::Enqueued => delivered += 1,
                Offer::Retiring => {
                    tracing::debug!(script = %target.name, kind = %command.kind, "Script retiring, command skipped");
                }
                Offer::Full => self.overflow(&target, &command),
            }
        }
        delivered
    }

    async fn offer(&self, target: &Target, command: &Arc<Command>) -> Offer {
        if target.retire.is_cancelled() {
            return Offer::Retiring;
        }
        match self.config.overflow_policy {
            OverflowPolicy::Drop => match target.tx.try_send(Arc::clone(command)) {
                Ok(()) => Offer::Enqueued,
                Err(TrySendError::Full(_)) => Offer::Full,
                Err(TrySendError::Closed(_)) => Offer::Retiring,
            },
            OverflowPolicy::Wait => tokio::select! {
                biased;

                _ = target.retire.cancelled() => Offer::Retiring,
                sent = target.tx.send(Arc::clone(command)) => match sent {
                    Ok(()) => Offer::Enqueued,
                    Err(_) => Offer::Retiring,
                },
            },
        }
    }

    fn overflow(&self, target: &Target, command: &Command) {
        target.counters.overflowed.fetch_add(1, Ordering::AcqRel);
        tracing::warn!(
            script = %target.name,
            kind = %command.kind,
            created_time = command.created_time,
            capacity = self.config.queue_capacity,
            "Script queue full, command dropped"
        );
        // Zero subscribers is fine.
        let _ = self.failures.send(ScriptFailure {
            script: target.name.to_string(),
            kind: command.kind,
            created_time: command.created_time,
            error: ScriptError::QueueFull { capacity: self.config.queue_capacity },
        });
    }

    /// Retires a script: it leaves the routing table at once, an enqueue
    /// waiting on its queue gives up, and its queue closes. Queued commands
    /// are drained or discarded per [`RetirePolicy`](crate::config::RetirePolicy),
    /// the in-flight delivery completes and the shutdown hook runs.
    ///
    /// Waits at most `retire_timeout` for the worker; a script stuck in
    /// `process` is left to finish in the background and reported with
    /// `worker_stopped == false`.
    pub async fn retire(&self, id: ScriptId) -> Result<RetireReport, RegistrationError> {
        let (name, counters, worker) = {
            let mut slots = self.slots.write();
            let slot = slots
                .iter_mut()
                .find(|slot| slot.id == id)
                .ok_or(RegistrationError::UnknownScript(id))?;

            if slot.state == ScriptState::Retired {
                return Err(RegistrationError::InvalidTransition {
                    script: slot.name.to_string(),
                    from: slot.state,
                    to: ScriptState::Retired,
                });
            }
            slot.state = ScriptState::Retired;
            let worker = slot.worker.take();
            if let Some(worker) = &worker {
                // Under the registry lock: no enqueue snapshot taken after this
                // point includes the script, and earlier ones see the signal.
                worker.begin_retire();
            }
            (Arc::clone(&slot.name), Arc::clone(&slot.counters), worker)
        };

        let worker_stopped = match worker {
            None => true,
            Some(worker) => match worker.stop(self.config.retire_timeout).await {
                StopOutcome::Stopped => true,
                StopOutcome::Detached => {
                    tracing::warn!(
                        script = %name,
                        timeout_ms = self.config.retire_timeout.as_millis() as u64,
                        "Script worker still busy after retire timeout, detaching it"
                    );
                    false
                }
                StopOutcome::Crashed(e) => {
                    tracing::error!(script = %name, error = %e, "Script worker terminated abnormally");
                    true
                }
            },
        };

        let counts = counters.snapshot();
        tracing::info!(
            script = %name,
            id = %id,
            policy = ?self.config.retire_policy,
            delivered = counts.delivered,
            failed = counts.failed,
            discarded = counts.discarded,
            overflowed = counts.overflowed,
            worker_stopped,
            "Retired script"
        );
        Ok(RetireReport {
            id,
            name: name.to_string(),
            delivered: counts.delivered,
            failed: counts.failed,
            discarded: counts.discarded,
            overflowed: counts.overflowed,
            worker_stopped,
        })
    }

    /// Retires every script that is not retired yet, in registration order.
    pub async fn shutdown(&self) -> Vec<RetireReport> {
        let pending: Vec<ScriptId> = self
            .slots
            .read()
            .iter()
            .filter(|slot| slot.state != ScriptState::Retired)
            .map(|slot| slot.id)
            .collect();

        let mut reports = Vec::with_capacity(pending.len());
        for id in pending {
            match self.retire(id).await {
                Ok(report) => reports.push(report),
                // Retired concurrently by someone else.
                Err(e) => tracing::debug!(id = %id, error = %e, "Skipping script during shutdown"),
            }
        }
        reports
    }

    /// Host-facing stream of script execution failures.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<ScriptFailure> {
        self.failures.subscribe()
    }

    pub fn script_id(&self, name: &str) -> Option<ScriptId> {
        self.slots.read().iter().find(|slot| &*slot.name == name).map(|slot| slot.id)
    }

    pub fn state(&self, id: ScriptId) -> Option<ScriptState> {
        self.slots.read().iter().find(|slot| slot.id == id).map(|slot| slot.state)
    }

    pub fn stats(&self, id: ScriptId) -> Option<ScriptStats> {
        let slots = self.slots.read();
        let slot = slots.iter().find(|slot| slot.id == id)?;
        let counts = slot.counters.snapshot();
        Some(ScriptStats {
            name: slot.name.to_string(),
            state: slot.state,
            interest: slot.interest,
            delivered: counts.delivered,
            failed: counts.failed,
            discarded: counts.discarded,
            overflowed: counts.overflowed,
            queued: slot.worker.as_ref().map_or(0, WorkerHandle::queued),
        })
    }

    /// Number of scripts currently [`ScriptState::Active`].
    pub fn active_count(&self) -> usize {
        self.slots.read().iter().filter(|slot| slot.state == ScriptState::Active).count()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("scripts", &slots.iter().map(|s| (s.id, s.state)).collect::<Vec<_>>())
            .finish()
    }
}
