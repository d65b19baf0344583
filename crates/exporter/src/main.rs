use anyhow::Result;
use clap::Parser;

use influxdb_exporter::app::Application;
use influxdb_exporter::config::Cli;
use influxdb_exporter::logging;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    logging::init();

    tracing::info!(
        "Starting influxdb_exporter {}",
        env!("CARGO_PKG_VERSION")
    );

    let app = Application::build(cli)?;
    app.run().await
}
