// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Code splitting: lazily loaded chunks.
//!
//! A chunk's modules are registered by its [`ChunkFetcher`] when the chunk is
//! loaded. Concurrent loads of the same chunk share one fetch, and dropping a
//! waiter does not cancel the fetch for the others.

use crate::error::{BoxError, Result, RuntimeError};
use crate::module_system::{ChunkId, ModuleDefinition};
use crate::runtime::RuntimeInner;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Supplies the module definitions of a chunk
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    /// Fetch every module definition belonging to `chunk`
    async fn fetch(&self, chunk: &ChunkId) -> std::result::Result<Vec<ModuleDefinition>, BoxError>;
}

/// Fetcher serving chunks held in memory
#[derive(Default)]
pub struct MemoryFetcher {
    chunks: DashMap<ChunkId, Vec<ModuleDefinition>>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    /// Create an empty fetcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace the contents of a chunk
    pub fn insert(&self, chunk: impl Into<ChunkId>, modules: Vec<ModuleDefinition>) {
        self.chunks.insert(chunk.into(), modules);
    }

    /// Module ids a chunk will provide, for [`declare_chunk`](crate::Runtime::declare_chunk)
    pub fn manifest(&self, chunk: &ChunkId) -> Vec<crate::module_system::ModuleId> {
        self.chunks
            .get(chunk)
            .map(|defs| defs.iter().map(|def| def.id().clone()).collect())
            .unwrap_or_default()
    }

    /// Number of fetches performed
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkFetcher for MemoryFetcher {
    async fn fetch(&self, chunk: &ChunkId) -> std::result::Result<Vec<ModuleDefinition>, BoxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.chunks
            .get(chunk)
            .map(|defs| defs.clone())
            .ok_or_else(|| format!("no such chunk '{}'", chunk).into())
    }
}

/// Error text is shared because every waiter of a load receives it.
type SharedLoad = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

/// Coalesces chunk loads
pub struct ChunkLoader {
    fetcher: Option<Arc<dyn ChunkFetcher>>,
    inflight: Mutex<HashMap<ChunkId, SharedLoad>>,
}

impl ChunkLoader {
    /// Create a loader; without a fetcher, loading only marks the chunk
    pub fn new(fetcher: Option<Arc<dyn ChunkFetcher>>) -> Self {
        Self {
            fetcher,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Chunks with a load in flight
    pub fn inflight(&self) -> Vec<ChunkId> {
        self.inflight.lock().keys().cloned().collect()
    }

    pub(crate) fn load(&self, rt: &Arc<RuntimeInner>, chunk: ChunkId) -> BoxFuture<'static, Result<()>> {
        if rt.registry.is_chunk_loaded(&chunk) {
            return futures::future::ready(Ok(())).boxed();
        }

        let shared = {
            let mut inflight = self.inflight.lock();
            // A load may have finished between the check above and the lock.
            if rt.registry.is_chunk_loaded(&chunk) {
                return futures::future::ready(Ok(())).boxed();
            }
            inflight
                .entry(chunk.clone())
                .or_insert_with(|| {
                    debug!(chunk = %chunk, "starting chunk load");
                    let load = fetch_and_register(Arc::downgrade(rt), self.fetcher.clone(), chunk.clone());
                    let shared = load.boxed().shared();
                    // Drive the load even if every waiter is dropped.
                    if let Ok(handle) = tokio::runtime::Handle::try_current() {
                        handle.spawn(shared.clone());
                    }
                    shared
                })
                .clone()
        };

        async move {
            shared
                .await
                .map_err(|reason| RuntimeError::ChunkLoadFailed { chunk, reason })
        }
        .boxed()
    }

    pub(crate) fn clear(&self) {
        self.inflight.lock().clear();
    }
}

#[instrument(skip_all, fields(chunk = %chunk))]
async fn fetch_and_register(
    runtime: Weak<RuntimeInner>,
    fetcher: Option<Arc<dyn ChunkFetcher>>,
    chunk: ChunkId,
) -> std::result::Result<(), String> {
    let fetched = match fetcher {
        Some(fetcher) => fetcher.fetch(&chunk).await.map_err(|e| e.to_string()),
        None => Ok(Vec::new()),
    };

    let rt = runtime.upgrade().ok_or_else(|| RuntimeError::RuntimeShutDown.to_string())?;
    let result = fetched.and_then(|definitions| {
        let count = definitions.len();
        definitions
            .into_iter()
            .try_for_each(|def| rt.register(def.chunk(chunk.clone())))
            .map(|()| count)
            .map_err(|e| e.to_string())
    });

    // The entry goes away on every outcome so a failed load can be retried.
    let mut inflight = rt.chunks.inflight.lock();
    match &result {
        Ok(count) => {
            rt.registry.mark_chunk_loaded(&chunk);
            info!(modules = count, "chunk loaded");
        }
        Err(reason) => warn!(%reason, "chunk load failed"),
    }
    inflight.remove(&chunk);
    result.map(|_| ())
}
