//! Identifier types and the monotonic per-namespace generator (component C2).

use std::fmt;

/// Declares a simple string-backed identifier newtype with the common trait
/// impls every id in this crate needs (`Display`, `From<String>`, borrowing
/// as `&str`). Unlike the teacher's `define_id!`, these are not nanoid-backed
/// and carry no fixed capacity — ids here are either generator output
/// (`"<namespace>-<n>"`) or pass-through strings handed to us by external
/// collaborators (initiator ids, cache keys).
macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(JobId);
string_id!(HelperRequestId);
string_id!(InitiatorId);
string_id!(WorkerId);
string_id!(WorkerName);
string_id!(CacheKey);

/// Monotonic unique-string generator per namespace (C2).
///
/// Thread-agnostic: callers are loop handlers, so there is never concurrent
/// access. Never reuses ids within a namespace for the life of the
/// generator.
#[derive(Debug, Clone)]
pub struct IdentifierGenerator {
    namespace: &'static str,
    next: u64,
}

impl IdentifierGenerator {
    pub fn new(namespace: &'static str) -> Self {
        Self { namespace, next: 1 }
    }

    /// Produces `"<namespace>-<n>"` and advances the counter.
    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.namespace, self.next);
        self.next += 1;
        id
    }
}

#[path = "ids_tests.rs"]
#[cfg(test)]
mod tests;
