use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use prometheus::Gauge;
use prometheus::IntCounter;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;

use crate::collector::InfluxCollector;
use crate::config::Cli;
use crate::store::SampleStore;

/// Everything the front ends, reaper and handlers share, constructed once at
/// startup and passed down explicitly instead of living in a global registry.
pub struct ExporterContext {
    pub store: Arc<SampleStore>,
    /// Registry behind the main metrics path: the sample collector plus the
    /// exporter's own ingestion counters.
    pub registry: Registry,
    /// Registry behind the self-diagnostics path: process-level metrics only.
    pub exporter_registry: Registry,
    pub last_push: Gauge,
    pub udp_parse_errors: IntCounter,
    pub sample_expiry: Duration,
    pub export_timestamp: bool,
    pub metrics_path: String,
    pub exporter_metrics_path: String,
}

impl ExporterContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let store = Arc::new(SampleStore::new());

        let last_push = Gauge::new(
            "influxdb_last_push_timestamp_seconds",
            "Unix timestamp of the last received influxdb metrics push in seconds.",
        )
        .context("create last push gauge")?;
        let udp_parse_errors = IntCounter::new(
            "influxdb_udp_parse_errors_total",
            "Current total udp parse errors.",
        )
        .context("create udp parse error counter")?;
        let build_info = IntGauge::with_opts(
            Opts::new("influxdb_exporter_build_info", "Build information of the exporter.")
                .const_label("version", env!("CARGO_PKG_VERSION")),
        )
        .context("create build info gauge")?;
        build_info.set(1);

        let registry = Registry::new();
        registry
            .register(Box::new(InfluxCollector::new(
                store.clone(),
                last_push.clone(),
                cli.sample_expiry,
                cli.export_timestamp,
            )))
            .context("register influxdb collector")?;
        registry
            .register(Box::new(udp_parse_errors.clone()))
            .context("register udp parse error counter")?;
        registry
            .register(Box::new(build_info))
            .context("register build info gauge")?;

        let exporter_registry = Registry::new();
        #[cfg(target_os = "linux")]
        exporter_registry
            .register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))
            .context("register process collector")?;

        Ok(Self {
            store,
            registry,
            exporter_registry,
            last_push,
            udp_parse_errors,
            sample_expiry: cli.sample_expiry,
            export_timestamp: cli.export_timestamp,
            metrics_path: cli.metrics_path.clone(),
            exporter_metrics_path: cli.exporter_metrics_path.clone(),
        })
    }
}
