// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Request resolution (alias, prefix alias, relative path, bare id)

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::module_system::ids::ModuleId;
use crate::module_system::path;
use crate::module_system::registry::Registry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Which rule produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveRule {
    /// Exact alias table match
    Alias,
    /// Longest matching prefix alias
    PrefixAlias,
    /// `./` / `../` / `/` path against the requesting module's path
    Relative,
    /// Request used as a module id or bundle path as written
    Bare,
}

/// Result of module resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Target module
    pub id: ModuleId,
    /// Rule that matched
    pub rule: ResolveRule,
}

#[derive(Debug, Default)]
struct AliasTable {
    exact: HashMap<String, String>,
    /// Registration order; later entries win ties.
    prefixes: Vec<(String, String)>,
}

/// Module resolver
pub struct ModuleResolver {
    aliases: RwLock<AliasTable>,
    /// Suffixes tried when a candidate path has no exact match
    extensions: Vec<String>,
    /// (requesting module, request) -> resolution
    table: DashMap<(Option<ModuleId>, String), Resolution>,
}

impl ModuleResolver {
    /// Create a resolver with the default extensions and no aliases
    pub fn new() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }

    /// Create a resolver from configured aliases and extensions
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let resolver = Self {
            aliases: RwLock::new(AliasTable::default()),
            extensions: config.extensions.clone(),
            table: DashMap::new(),
        };
        for (from, to) in &config.aliases {
            resolver.alias(from, to);
        }
        for (prefix, target) in &config.prefix_aliases {
            resolver.alias_prefix(prefix, target);
        }
        resolver
    }

    /// Add an exact alias: `request` resolves as if `target` had been written
    pub fn alias(&self, request: impl Into<String>, target: impl Into<String>) {
        self.aliases.write().exact.insert(request.into(), target.into());
        self.clear_cache();
    }

    /// Add a prefix alias: requests starting with `prefix` have it replaced
    /// by `target`
    pub fn alias_prefix(&self, prefix: impl Into<String>, target: impl Into<String>) {
        self.aliases.write().prefixes.push((prefix.into(), target.into()));
        self.clear_cache();
    }

    /// Drop cached resolutions
    pub fn clear_cache(&self) {
        self.table.clear();
    }

    /// Number of cached resolutions
    pub fn cached(&self) -> usize {
        self.table.len()
    }

    /// Resolve a request made by `from` (`None` for top-level requires)
    pub fn resolve(&self, registry: &Registry, request: &str, from: Option<&ModuleId>) -> Result<Resolution> {
        let key = (from.cloned(), request.to_string());
        if let Some(hit) = self.table.get(&key) {
            return Ok(hit.clone());
        }

        let resolution = self.resolve_uncached(registry, request, from)?;
        debug!(request, target = %resolution.id, rule = ?resolution.rule, "resolved");
        self.table.insert(key, resolution.clone());
        Ok(resolution)
    }

    fn resolve_uncached(&self, registry: &Registry, request: &str, from: Option<&ModuleId>) -> Result<Resolution> {
        let aliases = self.aliases.read();

        if let Some(target) = aliases.exact.get(request) {
            return self.finish(registry, target, ResolveRule::Alias, request, from);
        }

        if let Some((prefix, target)) = longest_prefix(&aliases.prefixes, request) {
            let candidate = format!("{}{}", target, &request[prefix.len()..]);
            return self.finish(registry, &candidate, ResolveRule::PrefixAlias, request, from);
        }

        if path::is_relative_request(request) || path::is_absolute(request) {
            let base = from
                .map(|id| registry.path_of(id).unwrap_or_else(|| id.to_string()))
                .unwrap_or_default();
            let candidate = path::join(path::dirname(&base), request);
            return self.finish(registry, &candidate, ResolveRule::Relative, request, from);
        }

        self.finish(registry, request, ResolveRule::Bare, request, from)
    }

    fn finish(
        &self,
        registry: &Registry,
        candidate: &str,
        rule: ResolveRule,
        request: &str,
        from: Option<&ModuleId>,
    ) -> Result<Resolution> {
        self.locate(registry, candidate)
            .map(|id| Resolution { id, rule })
            .ok_or_else(|| RuntimeError::unresolved(request, from))
    }

    /// Match a candidate against module ids, then recorded paths, then
    /// recorded paths with each extension appended
    fn locate(&self, registry: &Registry, candidate: &str) -> Option<ModuleId> {
        let id = ModuleId::from(candidate);
        if registry.is_known(&id) {
            return Some(id);
        }

        let canonical = path::canonical(candidate);
        if let Some(id) = registry.lookup_path(&canonical) {
            return Some(id);
        }

        self.extensions
            .iter()
            .find_map(|ext| registry.lookup_path(&format!("{}{}", canonical, ext)))
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Longest prefix matching `request`; on equal length the later entry wins
fn longest_prefix<'a>(prefixes: &'a [(String, String)], request: &str) -> Option<&'a (String, String)> {
    prefixes
        .iter()
        .filter(|(prefix, _)| request.starts_with(prefix.as_str()))
        .fold(None, |best: Option<&(String, String)>, entry| match best {
            Some(current) if current.0.len() > entry.0.len() => Some(current),
            _ => Some(entry),
        })
}
