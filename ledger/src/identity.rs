//! # Principals
//!
//! A [`Principal`] is the identity a call is made on behalf of: the
//! administrator, a verifier, a project developer, a credit owner or a
//! buyer. The ledger treats it as an opaque string. Authenticating that the
//! caller really is who they claim is the host's job, not ours.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a ledger participant.
///
/// Ordered so that registries keyed by principals iterate deterministically,
/// which keeps state roots stable across runs.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wraps an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty identity, which no caller may use.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for Principal {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
