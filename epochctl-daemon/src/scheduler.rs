//! Epoch-indexed request queue and the boundary handler that drains it.
//!
//! The queue and the revert snapshot live behind one mutex shared by the
//! receive loop (enqueue) and the host's stepping loop (boundary). A boundary
//! pass holds the lock for its whole apply phase, so a request arriving
//! mid-pass lands either fully before or fully after it.

use std::{collections::HashMap, sync::Arc};

use epochctl_core::{
    restriction::{filter_payload, restriction_notice},
    tree::{apply_update, merge_first_write_wins, PATH_SEPARATOR},
    ConfigPayload, ConfigRequest, EpochKey, Error, Namespace, Operation, RestrictionPolicy,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    errors::{DaemonError, Result},
    event_system::{EventSystem, EVENT_APPLY_ERROR, EVENT_BOUNDARY, EVENT_ENQUEUED, EVENT_REJECTED},
    host::TrainingHost,
};

/// Acknowledgment appended to every successful enqueue.
pub const ENQUEUED_MESSAGE: &str = "Enqueued config.";

#[derive(Debug, Default)]
struct SchedulerState {
    queue: HashMap<EpochKey, Vec<ConfigRequest>>,
    revert: Option<ConfigPayload>,
}

impl SchedulerState {
    fn pending(&self) -> usize { self.queue.values().map(Vec::len).sum() }
}

/// What one boundary pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryReport {
    /// The epoch that just finished.
    pub epoch: u64,
    /// A one-epoch snapshot from the previous boundary was restored.
    pub reverted: bool,
    /// Requests consumed from the queue.
    pub applied: usize,
    /// One-epoch requests whose explicit epoch had already passed; consumed without applying.
    pub dropped: usize,
    /// A new snapshot is waiting for the following boundary.
    pub revert_armed: bool,
    pub errors: Vec<String>,
}

impl BoundaryReport {
    pub fn is_clean(&self) -> bool { self.errors.is_empty() }
}

#[derive(Clone)]
pub struct EpochScheduler {
    state: Arc<Mutex<SchedulerState>>,
    policy: Arc<RestrictionPolicy>,
    events: EventSystem,
    max_pending: usize,
}

impl EpochScheduler {
    pub fn new(policy: RestrictionPolicy, events: EventSystem, max_pending: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            policy: Arc::new(policy),
            events,
            max_pending,
        }
    }

    pub fn policy(&self) -> &RestrictionPolicy { &self.policy }

    pub fn events(&self) -> &EventSystem { &self.events }

    /// Total requests waiting across all epoch keys.
    pub fn pending(&self) -> usize { self.state.lock().pending() }

    pub fn pending_for(&self, key: &EpochKey) -> usize {
        self.state.lock().queue.get(key).map_or(0, Vec::len)
    }

    pub fn has_revert(&self) -> bool { self.state.lock().revert.is_some() }

    /// Strip restricted keys and queue every request under its epoch key.
    ///
    /// Returns the restriction notices followed by the enqueue acknowledgment.
    /// Either all requests are queued or none are.
    pub fn enqueue(&self, requests: Vec<ConfigRequest>) -> Result<Vec<String>> {
        let mut messages = Vec::new();
        let mut filtered = Vec::with_capacity(requests.len());
        for mut request in requests {
            let removed = filter_payload(&mut request.payload, &self.policy);
            if let Some(notice) = restriction_notice(&request.epoch, &removed) {
                warn!(epoch = %request.epoch, removed = ?removed, "restricted keys stripped from request");
                messages.push(notice);
            }
            filtered.push(request);
        }

        let count = filtered.len();
        {
            let mut state = self.state.lock();
            let pending = state.pending();
            if pending + count > self.max_pending {
                drop(state);
                warn!(pending, limit = self.max_pending, "queue full, request refused");
                self.events.publish(EVENT_REJECTED, format!("queue full ({pending} pending)"));
                return Err(DaemonError::QueueFull { pending, limit: self.max_pending });
            }
            for request in filtered {
                state.queue.entry(request.epoch).or_default().push(request);
            }
        }

        info!(count, "enqueued config requests");
        self.events.publish(EVENT_ENQUEUED, format!("{count} request(s)"));
        messages.push(ENQUEUED_MESSAGE.to_string());
        Ok(messages)
    }

    /// Boundary handler, called once after epoch `epoch` finished.
    ///
    /// Restores the previous one-epoch snapshot, applies requests queued for
    /// `epoch + 1` in ascending priority, then requests queued for the next
    /// boundary in arrival order, and finally calls the host's own hook.
    /// Apply failures are reported, never raised.
    pub fn on_epoch_end<H: TrainingHost + ?Sized>(&self, epoch: u64, host: &mut H) -> BoundaryReport {
        let mut report = BoundaryReport { epoch, ..BoundaryReport::default() };
        {
            let mut state = self.state.lock();

            if let Some(snapshot) = state.revert.take() {
                debug!(epoch, "reverting one-epoch changes");
                apply_payload(host, &snapshot, &mut report.errors);
                report.reverted = true;
            }

            let target = epoch.saturating_add(1);
            let mut due: Vec<u64> = state
                .queue
                .keys()
                .filter_map(|key| match *key {
                    EpochKey::Epoch(n) if n <= target => Some(n),
                    _ => None,
                })
                .collect();
            due.sort_unstable();
            for n in due {
                let Some(mut requests) = state.queue.remove(&EpochKey::Epoch(n)) else { continue };
                if n < target {
                    // the single epoch these were meant for is gone
                    let before = requests.len();
                    requests.retain(|r| r.operation == Operation::PersistentUpdate);
                    let stale = before - requests.len();
                    if stale > 0 {
                        warn!(queued_for = n, epoch, stale, "dropping stale one-epoch requests");
                        report.dropped += stale;
                    }
                }
                requests.sort_by_key(|r| r.priority);
                for request in &requests {
                    apply_payload(host, &request.payload, &mut report.errors);
                    report.applied += 1;
                }
            }

            if let Some(requests) = state.queue.remove(&EpochKey::Next) {
                let mut snapshot = ConfigPayload::new();
                for request in &requests {
                    let previous = apply_payload(host, &request.payload, &mut report.errors);
                    report.applied += 1;
                    if request.operation == Operation::OneEpochUpdate {
                        for ns in Namespace::ALL {
                            merge_first_write_wins(snapshot.namespace_mut(ns), previous.namespace(ns));
                        }
                    }
                }
                if !snapshot.is_empty() {
                    state.revert = Some(snapshot);
                }
            }
            report.revert_armed = state.revert.is_some();
        }

        for e in &report.errors {
            error!(epoch, error = %e, "failed to apply config change");
            self.events.publish(EVENT_APPLY_ERROR, e.clone());
        }
        if report.applied > 0 || report.dropped > 0 || report.reverted {
            info!(epoch, applied = report.applied, dropped = report.dropped, reverted = report.reverted, revert_armed = report.revert_armed, "boundary processed");
        }
        self.events.publish(EVENT_BOUNDARY, format!("epoch {epoch}"));

        host.on_epoch_end(epoch);
        report
    }
}

/// Apply every namespace of `payload` to the host, returning the overwritten values.
fn apply_payload<H: TrainingHost + ?Sized>(host: &mut H, payload: &ConfigPayload, errors: &mut Vec<String>) -> ConfigPayload {
    let mut previous = ConfigPayload::new();
    for (ns, update) in payload.iter() {
        let applied = apply_update(host.live_config(ns), update);
        errors.extend(applied.errors.into_iter().map(|e| match e {
            Error::Apply { path, reason } => Error::apply(format!("{ns}{PATH_SEPARATOR}{path}"), reason).to_string(),
            other => other.to_string(),
        }));
        *previous.namespace_mut(ns) = applied.previous;
    }
    previous
}
