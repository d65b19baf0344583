use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::server::ApiServer;
use crate::config::Cli;
use crate::context::ExporterContext;
use crate::store;
use crate::udp::UdpFrontEnd;

/// Application core structure, wiring the shared context into every task.
pub struct Application {
    pub ctx: Arc<ExporterContext>,
    pub cli: Cli,
}

impl Application {
    /// Build the shared context from the parsed CLI.
    pub fn build(cli: Cli) -> Result<Self> {
        let ctx = Arc::new(ExporterContext::new(&cli)?);
        Ok(Self { ctx, cli })
    }

    /// Bind the listeners, start all tasks and wait for completion. Returns
    /// an error when a listener cannot be bound or a server task dies, so the
    /// process exits nonzero.
    pub async fn run(&self) -> Result<()> {
        // Bind before spawning anything: listener setup failures are fatal.
        let udp_socket = UdpSocket::bind(&self.cli.udp_bind_address)
            .await
            .with_context(|| {
                format!(
                    "Failed to set up UDP listener at address {}",
                    self.cli.udp_bind_address
                )
            })?;
        tracing::info!("Listening for UDP writes on {}", self.cli.udp_bind_address);

        let mut tasks = Tasks::new();
        tasks.spawn_all_tasks(self, udp_socket);
        tasks.wait_for_completion().await
    }
}

/// Task manager, responsible for starting and managing all background tasks
struct Tasks {
    tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Tasks {
    fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    fn spawn_all_tasks(&mut self, app: &Application, udp_socket: UdpSocket) {
        // Reaper task
        let reaper_task = {
            let store = app.ctx.store.clone();
            let sample_expiry = app.cli.sample_expiry;
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                tracing::info!("Starting reaper task");
                store::run_reaper(store, sample_expiry, token).await;
            })
        };
        self.tasks.push(reaper_task);

        // UDP front end task
        let udp_task = {
            let front_end = UdpFrontEnd::new(app.ctx.clone(), app.cli.max_udp_payload);
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                tracing::info!("Starting UDP listener task");
                front_end.run(udp_socket, token).await;
            })
        };
        self.tasks.push(udp_task);

        // HTTP server task; a server failure cancels every other task.
        let api_server_task = {
            let api_server = ApiServer::new(app.ctx.clone(), app.cli.listen_address.clone());
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                if let Err(e) = api_server.run(token.clone()).await {
                    tracing::error!("HTTP server failed: {e:?}");
                    token.cancel();
                } else {
                    tracing::info!("HTTP server task completed");
                }
            })
        };
        self.tasks.push(api_server_task);
    }

    /// Wait for a shutdown signal or an unexpected task failure, then cancel
    /// and drain every task.
    async fn wait_for_completion(&mut self) -> Result<()> {
        let failed = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                false
            }
            _ = self.cancellation_token.cancelled() => true
        };

        self.cancellation_token.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }

        if failed {
            anyhow::bail!("a server task terminated unexpectedly");
        }
        tracing::info!("All tasks stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn build_wires_the_context_from_the_cli() {
        let cli = Cli::parse_from(["influxdb_exporter", "--export-timestamp", "true"]);
        let app = Application::build(cli).expect("build");
        assert!(app.ctx.export_timestamp);
        assert!(app.ctx.store.is_empty());
    }

    #[tokio::test]
    async fn run_fails_fast_on_unbindable_udp_address() {
        let cli = Cli::parse_from([
            "influxdb_exporter",
            "--udp-bind-address",
            "256.0.0.1:9122",
        ]);
        let app = Application::build(cli).expect("build");
        assert!(app.run().await.is_err());
    }
}
