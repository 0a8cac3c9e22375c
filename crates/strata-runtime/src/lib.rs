// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # strata-runtime
//!
//! The in-memory runtime of a module bundler. A bundle registers its
//! compiled modules as factories; the runtime resolves `require` requests
//! between them, executes each factory once and memoizes its exports.
//!
//! - Lazy, memoized execution with safe circular requires
//! - Aliases, prefix aliases and relative-path resolution
//! - Code splitting with coalesced asynchronous chunk loads
//! - Hot module replacement that keeps exports identity
//! - Plugin hooks around registration and execution
//!
//! ## Quick Start
//!
//! ```rust
//! use strata_runtime::{ModuleDefinition, Runtime, Value};
//!
//! let rt = Runtime::new();
//! rt.register(ModuleDefinition::new("math", |_, _, exports| {
//!     exports.define_fn("double", |args| {
//!         let n = args.first().and_then(|v| v.as_number()).unwrap_or(0.0);
//!         Ok((n * 2.0).into())
//!     });
//!     Ok(())
//! }))?;
//!
//! let math = rt.require("math")?;
//! let doubled = math.call("double", &[Value::Number(21.0)]).map_err(|e| e.to_string());
//! assert_eq!(doubled.unwrap().as_number(), Some(42.0));
//! # Ok::<(), strata_runtime::RuntimeError>(())
//! ```
//!
//! ## Chunks
//!
//! ```rust,ignore
//! let fetcher = Arc::new(MemoryFetcher::new());
//! fetcher.insert("1", vec![ModuleDefinition::new(2, |_, _, exports| Ok(()))]);
//! let rt = Runtime::builder().fetcher(fetcher).build();
//!
//! rt.load_chunk("1").await?;
//! let lazy = rt.require("2")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunks;
pub mod config;
pub mod error;
pub mod hot;
pub mod module_system;
pub mod plugins;
pub mod runtime;
pub mod value;

// Re-exports
pub use chunks::{ChunkFetcher, MemoryFetcher};
pub use config::RuntimeConfig;
pub use error::{BoxError, Result, RuntimeError};
pub use hot::{Hot, HotEvent, UpdateReport};
pub use module_system::{ChunkId, Module, ModuleDefinition, ModuleId, ModuleState, Require};
pub use plugins::{HookPlugin, Plugin, TracingPlugin};
pub use runtime::{Runtime, RuntimeBuilder};
pub use value::{Exports, Function, Value};

/// Version of the strata runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
