// Copyright (c) 2026 Carbon Ledger Contributors. MIT License.
// See LICENSE for details.

//! # Carbon Ledger: Shared Plumbing
//!
//! Everything the credit engine needs from the outside world, expressed as
//! small typed seams so the engine itself stays a pure state machine:
//!
//! - **config**: Engine constants and the runtime [`MarketConfig`].
//! - **identity**: The opaque [`Principal`] every call is made on behalf of.
//! - **clock**: Timestamp source. Wall clock in production, manual in tests.
//! - **payment**: The value-transfer collaborator used to settle trades.
//! - **telemetry**: `tracing` subscriber setup (pretty or JSON).
//! - **metrics**: Prometheus counters mirroring market activity.
//! - **storage**: State roots and the sled-backed snapshot store.
//!
//! ## Design Principles
//!
//! 1. Amounts are integers. Tons and payment units are `u64`, and every
//!    arithmetic step on them is checked.
//! 2. Collaborators are traits. The engine never reaches for a global clock
//!    or a global wallet.
//! 3. Every persisted type is serde-serializable.

pub mod clock;
pub mod config;
pub mod identity;
pub mod metrics;
pub mod payment;
pub mod storage;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, MarketConfig, MintAuthorization};
pub use identity::Principal;
pub use metrics::MarketMetrics;
pub use payment::{PaymentError, PaymentGateway, PaymentLedger};
pub use storage::{SnapshotDb, StorageError};
pub use telemetry::{init_from_config, init_logging, LogFormat, TelemetryError};
