// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Hot module replacement.
//!
//! A module opts in by calling `module.hot().accept()` while it executes.
//! When such a module is updated, the new factory runs against the same
//! exports object the old generation populated, so every consumer that
//! holds the handle sees the new fields and the factory can carry state
//! forward by reading what is already there.
//!
//! A module that did not accept gets a fresh exports object; its consumers
//! are invalidated by [`HotManager::apply`] until one of them accepts.

use crate::error::{BoxError, Result, RuntimeError};
use crate::module_system::registry::{Factory, ModuleState};
use crate::module_system::ModuleId;
use crate::runtime::RuntimeInner;
use crate::value::Exports;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback run when an accepted module, or one of its dependencies, is
/// replaced
pub type AcceptCallback = Arc<dyn Fn(&HotEvent) -> std::result::Result<(), BoxError> + Send + Sync>;

/// An accept registration
#[derive(Clone, Default)]
pub struct HotAccept {
    pub(crate) callback: Option<AcceptCallback>,
}

impl HotAccept {
    /// Whether a callback was supplied
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn notify(&self, event: &HotEvent) -> std::result::Result<(), BoxError> {
        match &self.callback {
            Some(callback) => callback(event),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for HotAccept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotAccept")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Passed to accept callbacks
#[derive(Debug, Clone)]
pub struct HotEvent {
    /// Module whose factory was replaced
    pub updated: ModuleId,
    /// Its exports after the update
    pub exports: Exports,
    /// Its generation after the update
    pub generation: u64,
}

/// `module.hot`
pub struct Hot {
    enabled: bool,
    accept: Mutex<Option<HotAccept>>,
    previous: Option<Exports>,
}

impl Hot {
    pub(crate) fn new(enabled: bool, previous: Option<Exports>) -> Self {
        Self {
            enabled,
            accept: Mutex::new(None),
            previous,
        }
    }

    /// Whether hot replacement is enabled for this runtime
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Accept updates without a callback
    pub fn accept(&self) {
        *self.accept.lock() = Some(HotAccept::default());
    }

    /// Accept updates and be notified after each one
    pub fn accept_with<F>(&self, callback: F)
    where
        F: Fn(&HotEvent) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        *self.accept.lock() = Some(HotAccept {
            callback: Some(Arc::new(callback)),
        });
    }

    /// Exports of the generation being replaced; `None` on first execution
    pub fn previous_exports(&self) -> Option<&Exports> {
        self.previous.as_ref()
    }

    pub(crate) fn take_accept(&self) -> Option<HotAccept> {
        self.accept.lock().take()
    }
}

/// Outcome of [`HotManager::apply`]
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Modules re-executed successfully, in order
    pub applied: Vec<ModuleId>,
    /// Updates that failed and the reason
    pub failed: Vec<(ModuleId, RuntimeError)>,
    /// Consumers marked stale
    pub invalidated: BTreeSet<ModuleId>,
    /// Consumers whose accept registration absorbed an update
    pub accepted_by: Vec<ModuleId>,
}

impl UpdateReport {
    /// Whether every queued update applied
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

struct PendingUpdate {
    id: ModuleId,
    factory: Factory,
}

/// Queues and applies factory replacements
pub struct HotManager {
    enabled: bool,
    queue: Mutex<VecDeque<PendingUpdate>>,
}

impl HotManager {
    /// Create a manager
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Whether updates are accepted
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Ids waiting in the queue, oldest first
    pub fn pending(&self) -> Vec<ModuleId> {
        self.queue.lock().iter().map(|u| u.id.clone()).collect()
    }

    pub(crate) fn enqueue(&self, id: ModuleId, factory: Factory) {
        debug!(module = %id, "update queued");
        self.queue.lock().push_back(PendingUpdate { id, factory });
    }

    pub(crate) fn clear(&self) {
        self.queue.lock().clear();
    }

    /// Replace the factory of an executed module and re-run it now.
    ///
    /// Returns the module's exports after the update.
    pub(crate) fn update(&self, rt: &Arc<RuntimeInner>, id: &ModuleId, factory: Factory) -> Result<Exports> {
        if !self.enabled {
            return Err(RuntimeError::hot_update(id.clone(), "hot reload is disabled"));
        }

        let old = rt.registry.get(id)?;
        if old.state != ModuleState::Executed {
            return Err(RuntimeError::hot_update(
                id.clone(),
                format!("module is {:?}, not executed", old.state),
            ));
        }

        let previous_factory = rt.registry.update_factory(id, factory)?;

        // Self-accepting modules keep their exports object across generations.
        let (exports, snapshot) = match (&old.hot_accept, &old.exports_cache) {
            (Some(_), Some(cached)) => (cached.clone(), Some(cached.snapshot())),
            _ => (Exports::new(), None),
        };

        match rt.loader.execute(rt, id, exports, old.exports_cache.clone()) {
            Ok(exports) => {
                let generation = rt.registry.get(id).map(|r| r.generation).unwrap_or(old.generation + 1);
                info!(module = %id, generation, "hot update applied");

                if let Some(accept) = &old.hot_accept {
                    let event = HotEvent {
                        updated: id.clone(),
                        exports: exports.clone(),
                        generation,
                    };
                    accept
                        .notify(&event)
                        .map_err(|cause| RuntimeError::HotUpdateFailed { id: id.clone(), cause })?;
                }
                Ok(exports)
            }
            Err(err) => {
                if rt.registry.state_of(id) != Some(ModuleState::Executed) {
                    if let (Some(snapshot), Some(cached)) = (snapshot, &old.exports_cache) {
                        cached.restore(snapshot);
                    }
                    rt.registry.rollback_factory(id, previous_factory);
                }
                warn!(module = %id, error = %err, "hot update failed, keeping previous generation");
                Err(RuntimeError::HotUpdateFailed {
                    id: id.clone(),
                    cause: Box::new(err),
                })
            }
        }
    }

    /// Drain the queue in FIFO order and propagate each successful update
    /// to the modules that depend on it
    pub(crate) fn apply(&self, rt: &Arc<RuntimeInner>) -> UpdateReport {
        let mut report = UpdateReport::default();

        loop {
            // Popped one at a time so the lock is released while factories run.
            let Some(PendingUpdate { id, factory }) = self.queue.lock().pop_front() else {
                break;
            };

            let self_accepted = rt
                .registry
                .get(&id)
                .map(|record| record.hot_accept.is_some())
                .unwrap_or(false);

            match self.update(rt, &id, factory) {
                Ok(exports) => {
                    if !self_accepted {
                        self.propagate(rt, &id, &exports, &mut report);
                    }
                    report.applied.push(id);
                }
                Err(err) => report.failed.push((id, err)),
            }
        }

        info!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            invalidated = report.invalidated.len(),
            "updates applied"
        );
        report
    }

    /// Walk forward through dependents: accepting consumers absorb the
    /// update, everything else goes stale and passes it on.
    fn propagate(&self, rt: &Arc<RuntimeInner>, updated: &ModuleId, exports: &Exports, report: &mut UpdateReport) {
        let generation = rt.registry.get(updated).map(|r| r.generation).unwrap_or_default();
        let event = HotEvent {
            updated: updated.clone(),
            exports: exports.clone(),
            generation,
        };

        let mut visited: HashSet<ModuleId> = HashSet::from([updated.clone()]);
        let mut queue: VecDeque<ModuleId> = rt.registry.dependents_of(updated).into();

        while let Some(consumer) = queue.pop_front() {
            if !visited.insert(consumer.clone()) {
                continue;
            }
            let Ok(record) = rt.registry.get(&consumer) else {
                continue;
            };

            if let Some(accept) = &record.hot_accept {
                debug!(module = %consumer, updated = %updated, "update accepted by consumer");
                if let Err(cause) = accept.notify(&event) {
                    warn!(module = %consumer, error = %cause, "accept callback failed");
                    report
                        .failed
                        .push((consumer.clone(), RuntimeError::HotUpdateFailed { id: consumer.clone(), cause }));
                }
                report.accepted_by.push(consumer);
                continue;
            }

            if record.state == ModuleState::Executed {
                debug!(module = %consumer, "invalidated");
                rt.registry.set_state(&consumer, ModuleState::Invalidated);
                report.invalidated.insert(consumer.clone());
            }
            queue.extend(record.dependents.iter().cloned());
        }
    }
}

impl Default for HotManager {
    fn default() -> Self {
        Self::new(true)
    }
}
