// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module loader - executes factories and memoizes their exports.
//!
//! Execution is lazy: declared dependencies are never run ahead of time, a
//! module runs when the first `require` reaches it.
//!
//! ## Circular requires
//!
//! Requiring a module that is still on the execution stack does not fail.
//! The caller receives that module's exports object as it is at that moment.
//! Fields the module assigned before it called back into the cycle are
//! visible; fields it assigns later appear on the same object once it
//! finishes. Callers that copy fields out eagerly during the cycle observe
//! the partial state.

use crate::error::{Result, RuntimeError};
use crate::hot::Hot;
use crate::module_system::ids::ModuleId;
use crate::module_system::registry::ModuleState;
use crate::module_system::require::{Module, Require};
use crate::runtime::RuntimeInner;
use crate::value::Exports;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Module loader
pub struct ModuleLoader {
    /// Stack of currently executing modules
    stack: Mutex<Vec<ModuleId>>,
    /// Maximum stack depth
    max_depth: usize,
}

impl ModuleLoader {
    /// Create a loader with the given stack limit
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
            max_depth,
        }
    }

    /// Modules currently executing, outermost first
    pub fn stack(&self) -> Vec<ModuleId> {
        self.stack.lock().clone()
    }

    /// Resolve `request` from `from` and require the result
    pub(crate) fn require(&self, rt: &Arc<RuntimeInner>, request: &str, from: Option<&ModuleId>) -> Result<Exports> {
        let resolution = rt.resolver.resolve(&rt.registry, request, from)?;
        self.require_id(rt, &resolution.id, from)
    }

    /// Require a module by id
    pub(crate) fn require_id(&self, rt: &Arc<RuntimeInner>, id: &ModuleId, from: Option<&ModuleId>) -> Result<Exports> {
        let exports = self.load(rt, id)?;
        if let Some(from) = from {
            if from != id {
                rt.registry.add_dependent(id, from.clone());
            }
        }
        Ok(exports)
    }

    fn load(&self, rt: &Arc<RuntimeInner>, id: &ModuleId) -> Result<Exports> {
        let record = match rt.registry.get(id) {
            Ok(record) => record,
            Err(err) => {
                // Declared by a chunk manifest but not fetched yet. Once the
                // chunk is loaded a missing module is simply unknown.
                return match rt.registry.chunk_of(id) {
                    Some(chunk) if !rt.registry.is_chunk_loaded(&chunk) => Err(RuntimeError::ChunkNotLoaded {
                        module: id.clone(),
                        chunk,
                    }),
                    _ => Err(err),
                };
            }
        };

        match record.state {
            ModuleState::Executed => {
                if let Some(exports) = &record.exports_cache {
                    debug!(module = %id, "cache hit");
                    return Ok(exports.clone());
                }
            }
            ModuleState::Executing => {
                debug!(module = %id, stack = ?self.stack(), "circular require, returning partial exports");
                return Ok(record.pending_exports.unwrap_or_default());
            }
            ModuleState::Unexecuted | ModuleState::Invalidated => {}
        }

        if !rt.registry.is_chunk_loaded(&record.chunk_id) {
            return Err(RuntimeError::ChunkNotLoaded {
                module: id.clone(),
                chunk: record.chunk_id,
            });
        }

        self.execute(rt, id, Exports::new(), record.exports_cache)
    }

    /// Run the factory of `id` into `exports`.
    ///
    /// `previous` is the exports of the last successful generation, exposed
    /// to the factory through `module.hot()`. On failure the module is reset
    /// to `Unexecuted` and popped from the stack.
    pub(crate) fn execute(
        &self,
        rt: &Arc<RuntimeInner>,
        id: &ModuleId,
        exports: Exports,
        previous: Option<Exports>,
    ) -> Result<Exports> {
        let record = rt.registry.get(id)?;

        {
            let mut stack = self.stack.lock();
            if stack.len() >= self.max_depth {
                return Err(RuntimeError::ExecutionDepthExceeded {
                    id: id.clone(),
                    depth: self.max_depth,
                });
            }
            stack.push(id.clone());
        }

        if let Err(err) = rt.registry.begin_execution(id, exports.clone()) {
            self.pop(id);
            return Err(err);
        }

        if let Err(err) = rt.plugins.before_execute(id) {
            self.unwind(rt, id);
            return Err(err);
        }

        let module = Module::new(
            id.clone(),
            record.path.clone(),
            record.generation + 1,
            exports.clone(),
            Hot::new(rt.hot.enabled(), previous),
        );
        let require = Require::new(Arc::downgrade(rt), Some(id.clone()));

        debug!(module = %id, generation = record.generation + 1, "executing factory");
        if let Err(cause) = (record.factory)(&require, &module, &exports) {
            debug!(module = %id, error = %cause, "factory failed");
            self.unwind(rt, id);
            return Err(RuntimeError::ModuleExecution { id: id.clone(), cause });
        }

        rt.registry.commit_execution(id, exports.clone(), module.hot().take_accept());
        self.pop(id);

        rt.plugins.after_execute(id, &exports)?;
        Ok(exports)
    }

    fn unwind(&self, rt: &RuntimeInner, id: &ModuleId) {
        rt.registry.abort_execution(id);
        self.pop(id);
    }

    fn pop(&self, id: &ModuleId) {
        let mut stack = self.stack.lock();
        debug_assert_eq!(stack.last(), Some(id));
        stack.pop();
    }

    pub(crate) fn clear(&self) {
        self.stack.lock().clear();
    }
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new(1024)
    }
}
