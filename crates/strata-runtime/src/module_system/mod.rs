// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bundle module system
//!
//! - Registry of module records, keyed by id
//! - Request resolution (aliases, relative paths, bare ids)
//! - Lazy, memoized execution with circular-require support
//! - The `require` / `module` objects handed to factories

mod ids;
mod loader;
pub(crate) mod path;
pub(crate) mod registry;
mod require;
mod resolver;

pub use ids::{ChunkId, IdRepr, ModuleId};
pub use loader::ModuleLoader;
pub use registry::{factory, Chunk, Factory, ModuleDefinition, ModuleRecord, ModuleState, Registry};
pub use require::{Module, Require};
pub use resolver::{ModuleResolver, Resolution, ResolveRule};
