// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Plugin hooks around the module lifecycle.
//!
//! Plugins are notified in registration order. The first hook that fails
//! stops the notification and the error surfaces from the operation that
//! triggered it.

use crate::error::{BoxError, Result, RuntimeError};
use crate::module_system::ModuleId;
use crate::value::Exports;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle observer.
///
/// All hooks default to doing nothing.
pub trait Plugin: Send + Sync {
    /// Name used in error messages
    fn name(&self) -> &str;

    /// A module definition was registered
    fn module_registered(&self, _id: &ModuleId) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// A factory is about to run. Failing aborts the execution.
    fn before_execute(&self, _id: &ModuleId) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    /// A factory returned successfully
    fn after_execute(&self, _id: &ModuleId, _exports: &Exports) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

type IdHook = Box<dyn Fn(&ModuleId) -> std::result::Result<(), BoxError> + Send + Sync>;
type ExportsHook = Box<dyn Fn(&ModuleId, &Exports) -> std::result::Result<(), BoxError> + Send + Sync>;

/// A plugin assembled from closures
///
/// ```
/// use strata_runtime::plugins::HookPlugin;
///
/// let plugin = HookPlugin::new("logger")
///     .on_before_execute(|id| {
///         println!("loading {}", id);
///         Ok(())
///     });
/// ```
pub struct HookPlugin {
    name: String,
    registered: Option<IdHook>,
    before: Option<IdHook>,
    after: Option<ExportsHook>,
}

impl HookPlugin {
    /// Create a plugin with no hooks
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registered: None,
            before: None,
            after: None,
        }
    }

    /// Set the registration hook
    pub fn on_registered<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModuleId) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.registered = Some(Box::new(f));
        self
    }

    /// Set the pre-execution hook
    pub fn on_before_execute<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModuleId) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.before = Some(Box::new(f));
        self
    }

    /// Set the post-execution hook
    pub fn on_after_execute<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModuleId, &Exports) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.after = Some(Box::new(f));
        self
    }
}

impl Plugin for HookPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn module_registered(&self, id: &ModuleId) -> std::result::Result<(), BoxError> {
        self.registered.as_ref().map_or(Ok(()), |hook| hook(id))
    }

    fn before_execute(&self, id: &ModuleId) -> std::result::Result<(), BoxError> {
        self.before.as_ref().map_or(Ok(()), |hook| hook(id))
    }

    fn after_execute(&self, id: &ModuleId, exports: &Exports) -> std::result::Result<(), BoxError> {
        self.after.as_ref().map_or(Ok(()), |hook| hook(id, exports))
    }
}

impl fmt::Debug for HookPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPlugin").field("name", &self.name).finish()
    }
}

/// Logs every lifecycle event at `info`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPlugin;

impl Plugin for TracingPlugin {
    fn name(&self) -> &str {
        "tracing"
    }

    fn module_registered(&self, id: &ModuleId) -> std::result::Result<(), BoxError> {
        info!(module = %id, "registered");
        Ok(())
    }

    fn before_execute(&self, id: &ModuleId) -> std::result::Result<(), BoxError> {
        info!(module = %id, "loading");
        Ok(())
    }

    fn after_execute(&self, id: &ModuleId, exports: &Exports) -> std::result::Result<(), BoxError> {
        info!(module = %id, exports = ?exports.keys(), "loaded");
        Ok(())
    }
}

/// Ordered plugin list
#[derive(Default)]
pub struct PluginBus {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        debug!(plugin = plugin.name(), "plugin registered");
        self.plugins.write().push(plugin);
    }

    /// Number of plugins
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    /// Check if no plugin is registered
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    /// Plugin names in notification order
    pub fn names(&self) -> Vec<String> {
        self.plugins.read().iter().map(|p| p.name().to_string()).collect()
    }

    pub(crate) fn module_registered(&self, id: &ModuleId) -> Result<()> {
        self.emit(|plugin| plugin.module_registered(id))
    }

    pub(crate) fn before_execute(&self, id: &ModuleId) -> Result<()> {
        self.emit(|plugin| plugin.before_execute(id))
    }

    pub(crate) fn after_execute(&self, id: &ModuleId, exports: &Exports) -> Result<()> {
        self.emit(|plugin| plugin.after_execute(id, exports))
    }

    pub(crate) fn clear(&self) {
        self.plugins.write().clear();
    }

    /// Notify each plugin in turn. The list is copied first so a hook may
    /// register further plugins.
    fn emit<F>(&self, hook: F) -> Result<()>
    where
        F: Fn(&dyn Plugin) -> std::result::Result<(), BoxError>,
    {
        let plugins: Vec<Arc<dyn Plugin>> = self.plugins.read().clone();
        for plugin in plugins {
            hook(plugin.as_ref()).map_err(|cause| RuntimeError::PluginHook {
                plugin: plugin.name().to_string(),
                cause,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_emit_in_order() {
        let bus = PluginBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let log = log.clone();
            bus.register(Arc::new(HookPlugin::new(name).on_before_execute(move |id| {
                log.lock().push(format!("{}:{}", name, id));
                Ok(())
            })));
        }

        bus.before_execute(&ModuleId::from(7)).unwrap();
        assert_eq!(*log.lock(), vec!["first:7", "second:7"]);
        assert_eq!(bus.names(), vec!["first", "second"]);
    }

    #[test]
    fn test_first_error_stops_notification() {
        let bus = PluginBus::new();
        let reached = Arc::new(Mutex::new(false));

        bus.register(Arc::new(
            HookPlugin::new("veto").on_registered(|_| Err("not allowed".into())),
        ));
        let flag = reached.clone();
        bus.register(Arc::new(HookPlugin::new("late").on_registered(move |_| {
            *flag.lock() = true;
            Ok(())
        })));

        let err = bus.module_registered(&ModuleId::from("x")).unwrap_err();
        match err {
            RuntimeError::PluginHook { plugin, cause } => {
                assert_eq!(plugin, "veto");
                assert_eq!(cause.to_string(), "not allowed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!*reached.lock());
    }

    #[test]
    fn test_missing_hooks_are_noops() {
        let bus = PluginBus::new();
        bus.register(Arc::new(HookPlugin::new("empty")));
        bus.register(Arc::new(TracingPlugin));
        assert!(bus.after_execute(&ModuleId::from(1), &Exports::new()).is_ok());
        assert_eq!(bus.len(), 2);
    }
}
