//! Shared newtypes and utilities used across all protocol modules.
//!
//! These types are serialization-transparent: they serialize/deserialize as
//! plain JSON strings, so they can be used directly in wire types without
//! conversion overhead.

pub mod serde_util;
pub mod token;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Ok($name(s))
            }
        }
    };
}

// ─── State ───────────────────────────────────────────────────────────────────

string_newtype! {
    /// Correlation token binding one response to its originating request.
    ///
    /// Generated fresh per exchange and never reused. Also names the relay
    /// channel the response travels on.
    State
}

impl State {
    /// A fresh random token with 256 bits of entropy.
    pub fn generate() -> Self {
        Self(token::random_token())
    }
}

// ─── Nonce ───────────────────────────────────────────────────────────────────

string_newtype! {
    /// Request nonce for the OID4VP profile. Independent of [`State`] and never
    /// echoed back in the response.
    Nonce
}

impl Nonce {
    pub fn generate() -> Self {
        Self(token::random_token())
    }
}

// ─── ItemId ──────────────────────────────────────────────────────────────────

string_newtype! {
    /// Caller-assigned identifier of one credential request within a query
    /// (e.g. `"coverage-1"`).
    ItemId
}
