use std::time::Duration;

use clap::Parser;

/// InfluxDB line-protocol to Prometheus bridge.
///
/// Accepts writes over UDP and HTTP, normalizes every numeric field into a
/// labeled sample, and re-exposes the current sample set for scraping.
#[derive(Debug, Parser)]
#[command(name = "influxdb_exporter", about, long_about, version)]
pub struct Cli {
    #[arg(
        long,
        env = "WEB_LISTEN_ADDRESS",
        default_value = "0.0.0.0:9122",
        help = "Address on which to expose the HTTP endpoints"
    )]
    pub listen_address: String,

    #[arg(
        long,
        env = "UDP_BIND_ADDRESS",
        default_value = "0.0.0.0:9122",
        help = "Address on which to accept InfluxDB writes over UDP"
    )]
    pub udp_bind_address: String,

    #[arg(
        long,
        env = "SAMPLE_EXPIRY",
        default_value = "5m",
        value_parser = humantime::parse_duration,
        help = "How long a sample is valid for, e.g. 5m or 90s"
    )]
    pub sample_expiry: Duration,

    #[arg(
        long,
        env = "MAX_UDP_PAYLOAD",
        default_value_t = 64 * 1024,
        help = "Maximum accepted UDP datagram size in bytes"
    )]
    pub max_udp_payload: usize,

    #[arg(
        long,
        help = "Export the timestamp of each sample instead of letting the scraper assign one",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub export_timestamp: bool,

    #[arg(
        long,
        env = "WEB_TELEMETRY_PATH",
        default_value = "/metrics",
        help = "Path under which the ingested samples are exposed"
    )]
    pub metrics_path: String,

    #[arg(
        long,
        env = "WEB_EXPORTER_TELEMETRY_PATH",
        default_value = "/metrics/exporter",
        help = "Path under which the exporter's own process metrics are exposed"
    )]
    pub exporter_metrics_path: String,
}
