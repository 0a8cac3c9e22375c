// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry: records, path index and chunk table

use crate::error::{BoxError, Result, RuntimeError};
use crate::hot::HotAccept;
use crate::module_system::ids::{ChunkId, ModuleId};
use crate::module_system::path;
use crate::module_system::require::{Module, Require};
use crate::value::Exports;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A module factory: `(require, module, exports) -> Result`.
pub type Factory = Arc<dyn Fn(&Require, &Module, &Exports) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Wrap a closure as a [`Factory`]
pub fn factory<F>(f: F) -> Factory
where
    F: Fn(&Require, &Module, &Exports) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Lifecycle state of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Registered, never run (or last run failed)
    Unexecuted,
    /// Factory is on the execution stack
    Executing,
    /// Exports cached
    Executed,
    /// Cached exports are stale; the next require re-executes
    Invalidated,
}

/// Everything needed to register a module.
#[derive(Clone)]
pub struct ModuleDefinition {
    pub(crate) id: ModuleId,
    pub(crate) factory: Factory,
    pub(crate) dependencies: Vec<String>,
    pub(crate) chunk: ChunkId,
    pub(crate) path: Option<String>,
}

impl ModuleDefinition {
    /// Define a module in the main chunk with no declared dependencies
    pub fn new<F>(id: impl Into<ModuleId>, f: F) -> Self
    where
        F: Fn(&Require, &Module, &Exports) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::from_factory(id, factory(f))
    }

    /// Define a module from an existing factory
    pub fn from_factory(id: impl Into<ModuleId>, factory: Factory) -> Self {
        Self {
            id: id.into(),
            factory,
            dependencies: Vec::new(),
            chunk: ChunkId::main(),
            path: None,
        }
    }

    /// Declared dependency requests, in order
    pub fn dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Chunk the module belongs to
    pub fn chunk(mut self, chunk: impl Into<ChunkId>) -> Self {
        self.chunk = chunk.into();
        self
    }

    /// Bundle path of the module's source file
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Module id
    pub fn id(&self) -> &ModuleId {
        &self.id
    }
}

impl fmt::Debug for ModuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDefinition")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("chunk", &self.chunk)
            .field("path", &self.path)
            .finish()
    }
}

/// Registered module entry
#[derive(Clone)]
pub struct ModuleRecord {
    /// Module id
    pub id: ModuleId,
    /// Current factory
    pub factory: Factory,
    /// Declared dependency requests
    pub dependency_ids: Vec<String>,
    /// Chunk the module belongs to
    pub chunk_id: ChunkId,
    /// Canonical bundle path, if one was recorded
    pub path: Option<String>,
    /// Exports of the most recent successful execution
    pub exports_cache: Option<Exports>,
    /// Lifecycle state
    pub state: ModuleState,
    /// Accept registration of the current generation
    pub hot_accept: Option<HotAccept>,
    /// Number of successful executions
    pub generation: u64,
    /// Modules whose factories required this one
    pub dependents: BTreeSet<ModuleId>,
    /// Exports object of the in-flight execution
    pub(crate) pending_exports: Option<Exports>,
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("chunk_id", &self.chunk_id)
            .field("path", &self.path)
            .field("generation", &self.generation)
            .field("dependents", &self.dependents)
            .field("hot_accept", &self.hot_accept.is_some())
            .finish()
    }
}

/// A loadable group of modules
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Modules registered in or declared for the chunk
    pub modules: BTreeSet<ModuleId>,
    /// Whether the chunk has been loaded
    pub loaded: bool,
}

/// Registry owning every module record and the chunk table
#[derive(Default)]
pub struct Registry {
    records: DashMap<ModuleId, ModuleRecord>,
    /// Canonical path -> module
    paths: DashMap<String, ModuleId>,
    chunks: DashMap<ChunkId, Chunk>,
    /// Chunk manifest entries for modules not registered yet
    declared: DashMap<ModuleId, ChunkId>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of a module record
    pub fn get(&self, id: &ModuleId) -> Result<ModuleRecord> {
        self.records
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RuntimeError::UnknownModule(id.clone()))
    }

    /// Check if a module is registered
    pub fn contains(&self, id: &ModuleId) -> bool {
        self.records.contains_key(id)
    }

    /// Registered, or declared by a chunk manifest
    pub fn is_known(&self, id: &ModuleId) -> bool {
        self.records.contains_key(id) || self.declared.contains_key(id)
    }

    /// State of a registered module
    pub fn state_of(&self, id: &ModuleId) -> Option<ModuleState> {
        self.records.get(id).map(|entry| entry.state)
    }

    /// Chunk a module lives in, from its record or the chunk manifest
    pub fn chunk_of(&self, id: &ModuleId) -> Option<ChunkId> {
        if let Some(entry) = self.records.get(id) {
            return Some(entry.chunk_id.clone());
        }
        self.declared.get(id).map(|entry| entry.value().clone())
    }

    /// Modules that required `id`
    pub fn dependents_of(&self, id: &ModuleId) -> Vec<ModuleId> {
        self.records
            .get(id)
            .map(|entry| entry.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Registered module ids, sorted
    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.records.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no module is registered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Module registered under a canonical path
    pub fn lookup_path(&self, path: &str) -> Option<ModuleId> {
        self.paths.get(path).map(|entry| entry.value().clone())
    }

    /// Recorded path of a module
    pub fn path_of(&self, id: &ModuleId) -> Option<String> {
        self.records.get(id).and_then(|entry| entry.path.clone())
    }

    /// Snapshot of a chunk
    pub fn chunk(&self, chunk: &ChunkId) -> Option<Chunk> {
        self.chunks.get(chunk).map(|entry| entry.clone())
    }

    /// The main chunk is always loaded
    pub fn is_chunk_loaded(&self, chunk: &ChunkId) -> bool {
        chunk.is_main() || self.chunks.get(chunk).map(|entry| entry.loaded).unwrap_or(false)
    }

    /// Create or overwrite a record.
    ///
    /// Fails if the existing record holds live state (`Executed` or
    /// `Executing`). Returns the replaced record so callers can roll back.
    pub(crate) fn insert(&self, def: ModuleDefinition) -> Result<Option<ModuleRecord>> {
        let ModuleDefinition {
            id,
            factory,
            dependencies,
            chunk,
            path,
        } = def;

        let previous = match self.records.get(&id) {
            Some(existing) => {
                if matches!(existing.state, ModuleState::Executed | ModuleState::Executing) {
                    return Err(RuntimeError::DuplicateModule(id));
                }
                Some(existing.clone())
            }
            None => None,
        };

        let record = ModuleRecord {
            id: id.clone(),
            factory,
            dependency_ids: dependencies,
            chunk_id: chunk,
            path: path.map(|p| path::canonical(&p)),
            exports_cache: None,
            state: ModuleState::Unexecuted,
            hot_accept: None,
            generation: 0,
            dependents: previous
                .as_ref()
                .map(|prev| prev.dependents.clone())
                .unwrap_or_default(),
            pending_exports: None,
        };

        if let Some(prev) = &previous {
            self.unindex(prev);
        }
        self.index(&record);
        self.records.insert(id, record);

        Ok(previous)
    }

    /// Undo an [`insert`](Self::insert)
    pub(crate) fn restore(&self, id: &ModuleId, previous: Option<ModuleRecord>) {
        if let Some((_, current)) = self.records.remove(id) {
            self.unindex(&current);
        }
        if let Some(prev) = previous {
            self.index(&prev);
            self.records.insert(id.clone(), prev);
        }
    }

    /// Install a replacement factory; the exports cache is kept until the
    /// replacement has executed. Returns the previous factory.
    pub(crate) fn update_factory(&self, id: &ModuleId, factory: Factory) -> Result<Factory> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| RuntimeError::UnknownModule(id.clone()))?;
        entry.state = ModuleState::Invalidated;
        Ok(std::mem::replace(&mut entry.factory, factory))
    }

    /// Put back the previous generation after a failed hot update.
    ///
    /// No-op when the replacement already committed.
    pub(crate) fn rollback_factory(&self, id: &ModuleId, factory: Factory) -> bool {
        match self.records.get_mut(id) {
            Some(mut entry) if entry.state != ModuleState::Executed => {
                entry.factory = factory;
                entry.state = ModuleState::Executed;
                entry.pending_exports = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn begin_execution(&self, id: &ModuleId, exports: Exports) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| RuntimeError::UnknownModule(id.clone()))?;
        entry.state = ModuleState::Executing;
        entry.pending_exports = Some(exports);
        Ok(())
    }

    pub(crate) fn commit_execution(&self, id: &ModuleId, exports: Exports, accept: Option<HotAccept>) {
        if let Some(mut entry) = self.records.get_mut(id) {
            entry.exports_cache = Some(exports);
            entry.pending_exports = None;
            entry.state = ModuleState::Executed;
            entry.hot_accept = accept;
            entry.generation += 1;
        }
    }

    pub(crate) fn abort_execution(&self, id: &ModuleId) {
        if let Some(mut entry) = self.records.get_mut(id) {
            entry.state = ModuleState::Unexecuted;
            entry.pending_exports = None;
        }
    }

    pub(crate) fn set_state(&self, id: &ModuleId, state: ModuleState) {
        if let Some(mut entry) = self.records.get_mut(id) {
            entry.state = state;
        }
    }

    pub(crate) fn add_dependent(&self, id: &ModuleId, dependent: ModuleId) {
        if let Some(mut entry) = self.records.get_mut(id) {
            entry.dependents.insert(dependent);
        }
    }

    /// Record which modules a chunk will provide once loaded
    pub(crate) fn declare_chunk(&self, chunk: &ChunkId, modules: Vec<ModuleId>) {
        if chunk.is_main() {
            return;
        }
        let mut entry = self.chunks.entry(chunk.clone()).or_default();
        for id in modules {
            self.declared.insert(id.clone(), chunk.clone());
            entry.modules.insert(id);
        }
    }

    pub(crate) fn mark_chunk_loaded(&self, chunk: &ChunkId) {
        if chunk.is_main() {
            return;
        }
        self.chunks.entry(chunk.clone()).or_default().loaded = true;
    }

    pub(crate) fn clear(&self) {
        self.records.clear();
        self.paths.clear();
        self.chunks.clear();
        self.declared.clear();
    }

    fn index(&self, record: &ModuleRecord) {
        if let Some(p) = &record.path {
            self.paths.insert(p.clone(), record.id.clone());
        }
        if !record.chunk_id.is_main() {
            self.chunks
                .entry(record.chunk_id.clone())
                .or_default()
                .modules
                .insert(record.id.clone());
        }
    }

    fn unindex(&self, record: &ModuleRecord) {
        if let Some(p) = &record.path {
            self.paths.remove_if(p, |_, owner| owner == &record.id);
        }
        if record.chunk_id.is_main() {
            return;
        }
        // Manifest entries outlive the record.
        let declared_here = self
            .declared
            .get(&record.id)
            .map(|entry| entry.value() == &record.chunk_id)
            .unwrap_or(false);
        if !declared_here {
            if let Some(mut chunk) = self.chunks.get_mut(&record.chunk_id) {
                chunk.modules.remove(&record.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(id: &str) -> ModuleDefinition {
        ModuleDefinition::new(id, |_, _, _| Ok(()))
    }

    #[test]
    fn test_insert_and_get() {
        let registry = Registry::new();
        registry.insert(noop("a").path("./src/a.js")).unwrap();

        let record = registry.get(&ModuleId::from("a")).unwrap();
        assert_eq!(record.state, ModuleState::Unexecuted);
        assert_eq!(record.path.as_deref(), Some("src/a.js"));
        assert_eq!(registry.lookup_path("src/a.js"), Some(ModuleId::from("a")));
        assert!(registry.get(&ModuleId::from("missing")).is_err());
    }

    #[test]
    fn test_insert_rejects_live_state() {
        let registry = Registry::new();
        let id = ModuleId::from(1);
        registry.insert(noop("1")).unwrap();

        // Unexecuted: silent overwrite
        assert!(registry.insert(noop("1")).unwrap().is_some());

        registry.commit_execution(&id, Exports::new(), None);
        assert!(matches!(
            registry.insert(noop("1")),
            Err(RuntimeError::DuplicateModule(_))
        ));
    }

    #[test]
    fn test_restore_previous_record() {
        let registry = Registry::new();
        registry.insert(noop("a").path("old.js")).unwrap();
        let previous = registry.insert(noop("a").path("new.js")).unwrap();
        assert_eq!(registry.lookup_path("old.js"), None);

        registry.restore(&ModuleId::from("a"), previous);
        assert_eq!(registry.lookup_path("old.js"), Some(ModuleId::from("a")));
        assert_eq!(registry.lookup_path("new.js"), None);
    }

    #[test]
    fn test_update_factory_keeps_cache() {
        let registry = Registry::new();
        let id = ModuleId::from("a");
        registry.insert(noop("a")).unwrap();
        let exports = Exports::new();
        registry.commit_execution(&id, exports.clone(), None);

        registry.update_factory(&id, factory(|_, _, _| Ok(()))).unwrap();
        let record = registry.get(&id).unwrap();
        assert_eq!(record.state, ModuleState::Invalidated);
        assert!(record.exports_cache.unwrap().ptr_eq(&exports));
    }

    #[test]
    fn test_chunk_membership() {
        let registry = Registry::new();
        let lazy = ChunkId::from("lazy");
        registry.insert(noop("2").chunk("lazy")).unwrap();
        registry.declare_chunk(&lazy, vec![ModuleId::from(101)]);

        assert!(!registry.is_chunk_loaded(&lazy));
        assert!(registry.is_chunk_loaded(&ChunkId::main()));
        assert!(registry.is_known(&ModuleId::from(101)));
        assert!(!registry.contains(&ModuleId::from(101)));
        assert_eq!(registry.chunk_of(&ModuleId::from(101)), Some(lazy.clone()));

        let chunk = registry.chunk(&lazy).unwrap();
        assert_eq!(chunk.modules.len(), 2);

        registry.mark_chunk_loaded(&lazy);
        assert!(registry.is_chunk_loaded(&lazy));
    }
}
