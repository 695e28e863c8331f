//! # Prometheus Metrics
//!
//! Operational metrics mirroring market activity. The engine records into a
//! [`MarketMetrics`] when one is attached; the host decides how to expose
//! [`MarketMetrics::encode`] (HTTP endpoint, push gateway, log line).
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use crate::config::MarketConfig;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Holds all Prometheus metric handles for one market engine.
///
/// Clone-friendly: prometheus handles are reference counted internally.
#[derive(Clone)]
pub struct MarketMetrics {
    /// Registry that owns all metrics below.
    registry: Registry,
    /// Tons minted across all credits.
    pub minted_tons_total: IntCounter,
    /// Tons moved from active to retired.
    pub retired_tons_total: IntCounter,
    /// Tons settled through the marketplace.
    pub traded_tons_total: IntCounter,
    /// Listings currently open.
    pub listings_open: IntGauge,
    /// Rejected operations, labelled by operation and error class.
    pub operations_rejected_total: IntCounterVec,
}

impl MarketMetrics {
    /// Creates and registers all metrics under `namespace`.
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some(namespace.to_string()), None)?;

        let minted_tons_total =
            IntCounter::new("credits_minted_tons_total", "Total credit tons minted")?;
        registry.register(Box::new(minted_tons_total.clone()))?;

        let retired_tons_total =
            IntCounter::new("credits_retired_tons_total", "Total credit tons retired")?;
        registry.register(Box::new(retired_tons_total.clone()))?;

        let traded_tons_total = IntCounter::new(
            "credits_traded_tons_total",
            "Total credit tons settled through the marketplace",
        )?;
        registry.register(Box::new(traded_tons_total.clone()))?;

        let listings_open = IntGauge::new("listings_open", "Marketplace listings currently open")?;
        registry.register(Box::new(listings_open.clone()))?;

        let operations_rejected_total = IntCounterVec::new(
            Opts::new(
                "operations_rejected_total",
                "Operations rejected by precondition checks",
            ),
            &["operation", "class"],
        )?;
        registry.register(Box::new(operations_rejected_total.clone()))?;

        Ok(Self {
            registry,
            minted_tons_total,
            retired_tons_total,
            traded_tons_total,
            listings_open,
            operations_rejected_total,
        })
    }

    /// Creates metrics under the namespace configured in `config`.
    pub fn from_config(config: &MarketConfig) -> Result<Self, prometheus::Error> {
        Self::new(&config.metrics_namespace)
    }

    /// Counts one rejected call of `operation` with error class `class`.
    pub fn record_rejection(&self, operation: &str, class: &str) {
        self.operations_rejected_total
            .with_label_values(&[operation, class])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for MarketMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketMetrics")
            .field("minted_tons_total", &self.minted_tons_total.get())
            .field("retired_tons_total", &self.retired_tons_total.get())
            .field("traded_tons_total", &self.traded_tons_total.get())
            .field("listings_open", &self.listings_open.get())
            .finish()
    }
}
