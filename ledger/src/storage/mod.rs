//! # Storage Module
//!
//! The storage engine is an external collaborator of the market: the engine
//! keeps its registries in memory and hands out serializable snapshots. This
//! module provides the two pieces needed to persist those snapshots safely.
//!
//! ```text
//! state.rs: BLAKE3 leaf hashing and Merkle state roots
//! db.rs:    sled-backed snapshot store with atomic batch writes
//! ```
//!
//! ## Design Decisions
//!
//! 1. **BLAKE3 for state roots.** Equal registries hash to equal roots no
//!    matter how they were reached, so a restored snapshot can be checked
//!    against the root recorded when it was taken.
//!
//! 2. **Bincode on disk.** Compact and deterministic. Registries are keyed by
//!    composite tuples, which JSON object keys cannot represent anyway.

pub mod db;
pub mod state;

pub use db::{SnapshotDb, StorageError};
pub use state::{leaf_hash, merkle_root, StateRoot};
