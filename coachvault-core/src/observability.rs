/*!
Logging setup and optional Prometheus metrics.

Logging goes through `tracing`; hosts that do not install their own subscriber
can call [`init_observability`]. Metrics are only compiled in with the
`metrics` feature.
*/

#[cfg(feature = "metrics")]
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, VaultError};

/// Directive applied when `RUST_LOG` is not set
pub const DEFAULT_LOG_DIRECTIVE: &str = "coachvault=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<VaultMetrics> = OnceLock::new();

/// Counters for backup and restore activity
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct VaultMetrics {
    pub backups_total: IntCounter,
    pub restores_total: IntCounter,
    /// Records that failed to read, parse or write
    pub record_failures_total: IntCounter,
    /// Operations aborted before touching any record
    pub fatal_errors_total: IntCounter,
    pub archive_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help)
        .map_err(|e| VaultError::config(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| VaultError::config(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl VaultMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let backups_total = counter(
            &registry,
            "coachvault_backups_total",
            "Backups that produced an archive",
        )?;
        let restores_total = counter(
            &registry,
            "coachvault_restores_total",
            "Restores that got past validation and decryption",
        )?;
        let record_failures_total = counter(
            &registry,
            "coachvault_record_failures_total",
            "Records counted as zero after a read, parse or write failure",
        )?;
        let fatal_errors_total = counter(
            &registry,
            "coachvault_fatal_errors_total",
            "Backups and restores aborted with an error",
        )?;

        let archive_size_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "coachvault_archive_size_bytes",
                "Size of serialized archives in bytes",
            )
            .buckets(prometheus::exponential_buckets(1024.0, 4.0, 8).map_err(|e| {
                VaultError::config(format!("Invalid archive size buckets: {e}"))
            })?),
        )
        .map_err(|e| {
            VaultError::config(format!("Failed to create archive_size_bytes metric: {e}"))
        })?;
        registry
            .register(Box::new(archive_size_bytes.clone()))
            .map_err(|e| {
                VaultError::config(format!("Failed to register archive_size_bytes: {e}"))
            })?;

        Ok(Self {
            backups_total,
            restores_total,
            record_failures_total,
            fatal_errors_total,
            archive_size_bytes,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    ///
    /// # Panics
    /// If the fixed metric definitions fail to register, which only happens on
    /// a programming error.
    pub fn global() -> &'static VaultMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize CoachVault metrics"))
    }

    pub fn record_backup(&self) {
        self.backups_total.inc();
    }

    pub fn record_restore(&self) {
        self.restores_total.inc();
    }

    pub fn record_record_failures(&self, count: usize) {
        self.record_failures_total.inc_by(count as u64);
    }

    pub fn record_fatal_error(&self) {
        self.fatal_errors_total.inc();
    }

    pub fn record_archive_size(&self, size_bytes: usize) {
        self.archive_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in the Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| VaultError::config(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| VaultError::config(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Install the global `tracing` subscriber, logging to stderr
///
/// `RUST_LOG` takes precedence; otherwise [`DEFAULT_LOG_DIRECTIVE`] applies.
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
pub fn init_observability(json: bool) -> Result<()> {
    init_observability_with(json, DEFAULT_LOG_DIRECTIVE)
}

/// Like [`init_observability`], with the filter used when `RUST_LOG` is unset
pub fn init_observability_with(json: bool, default_directive: &str) -> Result<()> {
    #[cfg(feature = "metrics")]
    VaultMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| VaultError::config(format!("Invalid log filter: {e}")))?;

    let result = if json {
        let subscriber = TracingRegistry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_current_span(false),
        );
        set_global_default(subscriber)
    } else {
        let subscriber = TracingRegistry::default()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            );
        set_global_default(subscriber)
    };

    result.map_err(|e| {
        VaultError::config(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("CoachVault logging initialized");
    Ok(())
}
