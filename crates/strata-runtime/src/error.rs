// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the bundler runtime

use crate::module_system::{ChunkId, ModuleId};
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Boxed error raised by user code: module factories, plugin hooks,
/// accept callbacks and chunk fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the bundler runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A module with live state is already registered under this id
    #[error("Module '{0}' is already registered and has executed")]
    DuplicateModule(ModuleId),

    /// No module is registered under this id
    #[error("Unknown module '{0}'")]
    UnknownModule(ModuleId),

    /// No resolution rule or registry entry matched the request
    #[error("Cannot resolve '{request}' from '{from}'")]
    UnresolvedModule {
        /// The request string as written by the caller
        request: String,
        /// The requesting module, or `<root>` for top-level requires
        from: String,
    },

    /// The module factory failed
    #[error("Error executing module '{id}': {cause}")]
    ModuleExecution {
        /// Failing module
        id: ModuleId,
        /// Error raised by the factory
        #[source]
        cause: BoxError,
    },

    /// The module lives in a chunk that has not been loaded
    #[error("Module '{module}' belongs to chunk '{chunk}' which is not loaded; call load_chunk(\"{chunk}\") first")]
    ChunkNotLoaded {
        /// Required module
        module: ModuleId,
        /// Chunk that has to be loaded first
        chunk: ChunkId,
    },

    /// Loading a chunk failed; every waiter observes the same failure
    #[error("Failed to load chunk '{chunk}': {reason}")]
    ChunkLoadFailed {
        /// Chunk being loaded
        chunk: ChunkId,
        /// Rendered failure
        reason: String,
    },

    /// A hot update was rejected or its factory failed
    #[error("Hot update of module '{id}' failed: {cause}")]
    HotUpdateFailed {
        /// Module being replaced
        id: ModuleId,
        /// Why the update did not apply
        #[source]
        cause: BoxError,
    },

    /// A plugin hook failed and aborted the triggering operation
    #[error("Plugin '{plugin}' failed: {cause}")]
    PluginHook {
        /// Name of the failing plugin
        plugin: String,
        /// Error raised by the hook
        #[source]
        cause: BoxError,
    },

    /// The execution stack grew past the configured limit
    #[error("Execution depth {depth} exceeded while requiring '{id}'")]
    ExecutionDepthExceeded {
        /// Module that would have been pushed
        id: ModuleId,
        /// Configured limit
        depth: usize,
    },

    /// A bound require outlived its runtime
    #[error("Runtime has been torn down")]
    RuntimeShutDown,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RuntimeError {
    /// Create an unresolved module error
    pub fn unresolved(request: impl Into<String>, from: Option<&ModuleId>) -> Self {
        Self::UnresolvedModule {
            request: request.into(),
            from: from.map(|id| id.to_string()).unwrap_or_else(|| "<root>".to_string()),
        }
    }

    /// Create a hot update failure from a message
    pub fn hot_update(id: ModuleId, reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Self::HotUpdateFailed {
            id,
            cause: reason.into(),
        }
    }

    /// Whether this error came out of a module factory
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::ModuleExecution { .. })
    }
}
