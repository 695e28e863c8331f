//! # State Roots
//!
//! A state root is a 32-byte commitment to the entire contents of the
//! market's registries. Each registry entry becomes a leaf:
//!
//! ```text
//! leaf  = BLAKE3(domain || bincode(entry))
//! root  = merkle_root(leaves in registry iteration order)
//! ```
//!
//! Registries iterate in key order, so the leaf sequence and therefore the
//! root depend only on the contents, never on insertion history.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::db::StorageError;

/// A 32-byte Merkle root over ledger state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateRoot(pub [u8; 32]);

impl StateRoot {
    /// The root of an empty ledger.
    pub const EMPTY: StateRoot = StateRoot([0u8; 32]);

    /// Hex encoding, for logs and operator tooling.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StateRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hashes one registry entry under a domain tag.
///
/// The domain keeps a credit and a listing with identical bytes from
/// producing the same leaf.
pub fn leaf_hash<T: Serialize + ?Sized>(domain: &str, entry: &T) -> Result<[u8; 32], StorageError> {
    let bytes = bincode::serialize(entry).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(&bytes);
    Ok(*hasher.finalize().as_bytes())
}

/// Folds leaves into a binary Merkle root.
///
/// Odd nodes are paired with themselves. An empty leaf set yields
/// [`StateRoot::EMPTY`].
pub fn merkle_root(mut leaves: Vec<[u8; 32]>) -> StateRoot {
    if leaves.is_empty() {
        return StateRoot::EMPTY;
    }

    while leaves.len() > 1 {
        let mut next_level = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = blake3::Hasher::new();
            hasher.update(&chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next_level.push(*hasher.finalize().as_bytes());
        }
        leaves = next_level;
    }

    StateRoot(leaves[0])
}
