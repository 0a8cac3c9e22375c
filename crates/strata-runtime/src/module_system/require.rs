// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The `require` function and `module` object handed to factories

use crate::error::{Result, RuntimeError};
use crate::hot::Hot;
use crate::module_system::ids::ModuleId;
use crate::runtime::RuntimeInner;
use crate::value::Exports;
use std::sync::{Arc, Weak};

/// `require` bound to the module that is asking.
///
/// Holds a weak reference to its runtime, so closures that capture it do
/// not keep a torn-down runtime alive.
#[derive(Clone)]
pub struct Require {
    runtime: Weak<RuntimeInner>,
    from: Option<ModuleId>,
}

impl Require {
    pub(crate) fn new(runtime: Weak<RuntimeInner>, from: Option<ModuleId>) -> Self {
        Self { runtime, from }
    }

    fn runtime(&self) -> Result<Arc<RuntimeInner>> {
        self.runtime
            .upgrade()
            .filter(|rt| !rt.is_shut_down())
            .ok_or(RuntimeError::RuntimeShutDown)
    }

    /// Require a module by request string (alias, relative path or id).
    ///
    /// If the target is still executing further up the stack, this returns
    /// its partially populated exports.
    pub fn call(&self, request: &str) -> Result<Exports> {
        let rt = self.runtime()?;
        rt.loader.require(&rt, request, self.from.as_ref())
    }

    /// Require a module by id, skipping resolution
    pub fn id(&self, id: impl Into<ModuleId>) -> Result<Exports> {
        let rt = self.runtime()?;
        rt.loader.require_id(&rt, &id.into(), self.from.as_ref())
    }

    /// `require.resolve()`: the module id a request maps to
    pub fn resolve(&self, request: &str) -> Result<ModuleId> {
        let rt = self.runtime()?;
        rt.resolver
            .resolve(&rt.registry, request, self.from.as_ref())
            .map(|resolution| resolution.id)
    }

    /// The module this require is bound to (`None` at top level)
    pub fn parent(&self) -> Option<&ModuleId> {
        self.from.as_ref()
    }
}

/// The `module` object of one execution
pub struct Module {
    id: ModuleId,
    path: Option<String>,
    generation: u64,
    exports: Exports,
    hot: Hot,
}

impl Module {
    pub(crate) fn new(id: ModuleId, path: Option<String>, generation: u64, exports: Exports, hot: Hot) -> Self {
        Self {
            id,
            path,
            generation,
            exports,
            hot,
        }
    }

    /// Module id
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Recorded bundle path
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Generation this execution will produce (1 for the first run)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `module.exports`: the same object passed as the factory's third
    /// argument
    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    /// `module.hot`
    pub fn hot(&self) -> &Hot {
        &self.hot
    }
}
