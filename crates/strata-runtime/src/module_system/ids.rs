// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module and chunk identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "IdRepr", into = "String")]
        pub struct $name(Arc<str>);

        impl $name {
            /// The identifier as a string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<&String> for $name {
            fn from(s: &String) -> Self {
                Self(Arc::from(s.as_str()))
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                Self(Arc::from(n.to_string()))
            }
        }

        impl From<u32> for $name {
            fn from(n: u32) -> Self {
                Self::from(n as u64)
            }
        }

        impl From<i32> for $name {
            fn from(n: i32) -> Self {
                Self(Arc::from(n.to_string()))
            }
        }

        impl From<&$name> for $name {
            fn from(id: &$name) -> Self {
                id.clone()
            }
        }

        impl From<IdRepr> for $name {
            fn from(repr: IdRepr) -> Self {
                match repr {
                    IdRepr::Number(n) => Self::from(n),
                    IdRepr::Text(s) => Self::from(s),
                }
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                &*self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                &*self.0 == *other
            }
        }
    };
}

/// Identifiers may be written as numbers or strings in configuration.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum IdRepr {
    /// Numeric form
    Number(u64),
    /// String form
    Text(String),
}

string_id! {
    /// Stable module identifier.
    ///
    /// Numeric ids are kept in decimal form, so `ModuleId::from(3)` and
    /// `ModuleId::from("3")` name the same module.
    ModuleId
}

string_id! {
    /// Chunk identifier. [`ChunkId::main`] (`"0"`) is always loaded.
    ChunkId
}

impl ChunkId {
    /// The main chunk, present in the initial bundle
    pub fn main() -> Self {
        Self::from(0u64)
    }

    /// Whether this is the always-available main chunk
    pub fn is_main(&self) -> bool {
        &*self.0 == "0"
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::main()
    }
}
