// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Main bundle runtime

use crate::chunks::{ChunkFetcher, ChunkLoader};
use crate::config::RuntimeConfig;
use crate::error::{BoxError, Result, RuntimeError};
use crate::hot::{HotManager, UpdateReport};
use crate::module_system::{
    factory, ChunkId, Module, ModuleDefinition, ModuleId, ModuleLoader, ModuleRecord, ModuleResolver, ModuleState,
    Registry, Require, Resolution,
};
use crate::plugins::{Plugin, PluginBus, TracingPlugin};
use crate::value::Exports;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by every handle of one runtime
pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) registry: Registry,
    pub(crate) resolver: ModuleResolver,
    pub(crate) plugins: PluginBus,
    pub(crate) loader: ModuleLoader,
    pub(crate) chunks: ChunkLoader,
    pub(crate) hot: HotManager,
    shut_down: AtomicBool,
}

impl RuntimeInner {
    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(RuntimeError::RuntimeShutDown);
        }
        Ok(())
    }

    /// Insert a definition and notify plugins; a plugin failure puts the
    /// previous record back
    pub(crate) fn register(&self, def: ModuleDefinition) -> Result<()> {
        self.ensure_live()?;
        let id = def.id().clone();
        let previous = self.registry.insert(def)?;
        self.resolver.clear_cache();

        if let Err(err) = self.plugins.module_registered(&id) {
            debug!(module = %id, "registration rejected by plugin");
            self.registry.restore(&id, previous);
            self.resolver.clear_cache();
            return Err(err);
        }

        debug!(module = %id, "registered");
        Ok(())
    }
}

/// A bundle runtime.
///
/// Cloning yields another handle to the same registry, resolver, plugins
/// and chunk state.
///
/// ```
/// use strata_runtime::{ModuleDefinition, Runtime};
///
/// let rt = Runtime::new();
/// rt.register(ModuleDefinition::new(0, |require, _module, exports| {
///     let dog = require.call("./dog")?;
///     exports.set("greeting", format!("{} says hi", dog.get("name")));
///     Ok(())
/// }))
/// .unwrap();
/// rt.register(
///     ModuleDefinition::new(1, |_, _, exports| {
///         exports.set("name", "Rex");
///         Ok(())
///     })
///     .path("dog.js"),
/// )
/// .unwrap();
///
/// let main = rt.require("0").unwrap();
/// assert_eq!(main.get("greeting").as_str(), Some("Rex says hi"));
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a runtime from a configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Start building a runtime
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Effective configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    // ----- registry -----

    /// Register a module definition.
    ///
    /// Replacing a record that has not executed is allowed. Replacing live
    /// state fails with [`RuntimeError::DuplicateModule`]; use
    /// [`update`](Self::update) for that.
    pub fn register(&self, def: ModuleDefinition) -> Result<()> {
        self.inner.register(def)
    }

    /// Snapshot of a module record
    pub fn get(&self, id: impl Into<ModuleId>) -> Result<ModuleRecord> {
        self.inner.registry.get(&id.into())
    }

    /// Lifecycle state of a module
    pub fn state_of(&self, id: impl Into<ModuleId>) -> Option<ModuleState> {
        self.inner.registry.state_of(&id.into())
    }

    /// The module registry
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Modules currently executing, outermost first
    pub fn execution_stack(&self) -> Vec<ModuleId> {
        self.inner.loader.stack()
    }

    // ----- require / resolve -----

    /// Require a module from top level
    pub fn require(&self, request: &str) -> Result<Exports> {
        self.inner.ensure_live()?;
        self.inner.loader.require(&self.inner, request, None)
    }

    /// Require a module as if from inside `from`'s factory
    pub fn require_from(&self, request: &str, from: &ModuleId) -> Result<Exports> {
        self.inner.ensure_live()?;
        self.inner.loader.require(&self.inner, request, Some(from))
    }

    /// Require a module by id, skipping resolution
    pub fn require_id(&self, id: impl Into<ModuleId>) -> Result<Exports> {
        self.inner.ensure_live()?;
        self.inner.loader.require_id(&self.inner, &id.into(), None)
    }

    /// A `require` bound to top level, for hosts that hand it on
    pub fn root_require(&self) -> Require {
        Require::new(Arc::downgrade(&self.inner), None)
    }

    /// Module id `request` maps to when made from `from`
    pub fn resolve(&self, request: &str, from: Option<&ModuleId>) -> Result<ModuleId> {
        self.resolve_explained(request, from).map(|resolution| resolution.id)
    }

    /// Like [`resolve`](Self::resolve), also reporting which rule matched
    pub fn resolve_explained(&self, request: &str, from: Option<&ModuleId>) -> Result<Resolution> {
        self.inner.resolver.resolve(&self.inner.registry, request, from)
    }

    /// Add an exact alias
    pub fn alias(&self, request: impl Into<String>, target: impl Into<String>) {
        self.inner.resolver.alias(request, target);
    }

    /// Add a prefix alias
    pub fn alias_prefix(&self, prefix: impl Into<String>, target: impl Into<String>) {
        self.inner.resolver.alias_prefix(prefix, target);
    }

    // ----- chunks -----

    /// Record the module ids a chunk will provide, so requiring them before
    /// the chunk is loaded reports [`RuntimeError::ChunkNotLoaded`]
    pub fn declare_chunk<I, M>(&self, chunk: impl Into<ChunkId>, modules: I)
    where
        I: IntoIterator<Item = M>,
        M: Into<ModuleId>,
    {
        let chunk = chunk.into();
        self.inner
            .registry
            .declare_chunk(&chunk, modules.into_iter().map(Into::into).collect());
        self.inner.resolver.clear_cache();
    }

    /// Load a chunk. Resolves immediately when the chunk is already
    /// loaded; concurrent calls share a single fetch.
    pub fn load_chunk(&self, chunk: impl Into<ChunkId>) -> BoxFuture<'static, Result<()>> {
        self.inner.chunks.load(&self.inner, chunk.into())
    }

    /// Chunks with a load in flight
    pub fn chunks_in_flight(&self) -> Vec<ChunkId> {
        self.inner.chunks.inflight()
    }

    /// Whether a chunk is loaded
    pub fn is_chunk_loaded(&self, chunk: impl Into<ChunkId>) -> bool {
        self.inner.registry.is_chunk_loaded(&chunk.into())
    }

    // ----- hot replacement -----

    /// Replace the factory of an executed module and re-run it now.
    ///
    /// On failure the previous generation keeps serving.
    pub fn update<F>(&self, id: impl Into<ModuleId>, f: F) -> Result<Exports>
    where
        F: Fn(&Require, &Module, &Exports) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.inner.ensure_live()?;
        self.inner.hot.update(&self.inner, &id.into(), factory(f))
    }

    /// Queue a replacement for [`apply_updates`](Self::apply_updates)
    pub fn queue_update<F>(&self, id: impl Into<ModuleId>, f: F)
    where
        F: Fn(&Require, &Module, &Exports) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.inner.hot.enqueue(id.into(), factory(f));
    }

    /// Ids waiting for [`apply_updates`](Self::apply_updates)
    pub fn pending_updates(&self) -> Vec<ModuleId> {
        self.inner.hot.pending()
    }

    /// Apply queued updates in order and propagate them to consumers
    pub fn apply_updates(&self) -> UpdateReport {
        self.inner.hot.apply(&self.inner)
    }

    // ----- plugins -----

    /// Append a plugin
    pub fn register_plugin<P: Plugin + 'static>(&self, plugin: P) {
        self.inner.plugins.register(Arc::new(plugin));
    }

    /// Names of registered plugins, in notification order
    pub fn plugin_names(&self) -> Vec<String> {
        self.inner.plugins.names()
    }

    /// Tear the runtime down.
    ///
    /// Pending chunk loads and queued updates are dropped and every record
    /// is released. `Require` handles held by module closures fail with
    /// [`RuntimeError::RuntimeShutDown`] afterwards.
    pub fn teardown(self) {
        info!(modules = self.inner.registry.len(), "tearing down runtime");
        self.inner.shut_down.store(true, Ordering::Release);
        self.inner.chunks.clear();
        self.inner.hot.clear();
        self.inner.plugins.clear();
        self.inner.loader.clear();
        self.inner.registry.clear();
        self.inner.resolver.clear_cache();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("modules", &self.inner.registry.len())
            .field("plugins", &self.inner.plugins.names())
            .field("hot_reload", &self.inner.hot.enabled())
            .finish()
    }
}

/// Builder for [`Runtime`]
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    fetcher: Option<Arc<dyn ChunkFetcher>>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl RuntimeBuilder {
    /// Use this configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Fetch chunk contents through `fetcher`
    pub fn fetcher(mut self, fetcher: Arc<dyn ChunkFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Install a plugin at construction
    pub fn plugin<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Build the runtime
    pub fn build(self) -> Runtime {
        let RuntimeBuilder {
            config,
            fetcher,
            plugins,
        } = self;

        let bus = PluginBus::new();
        if config.log_plugin {
            bus.register(Arc::new(TracingPlugin));
        }
        for plugin in plugins {
            bus.register(plugin);
        }

        let inner = RuntimeInner {
            registry: Registry::new(),
            resolver: ModuleResolver::from_config(&config),
            plugins: bus,
            loader: ModuleLoader::new(config.max_execution_depth),
            chunks: ChunkLoader::new(fetcher),
            hot: HotManager::new(config.hot_reload),
            shut_down: AtomicBool::new(false),
            config,
        };

        debug!(hot_reload = inner.config.hot_reload, "runtime created");
        Runtime { inner: Arc::new(inner) }
    }
}
