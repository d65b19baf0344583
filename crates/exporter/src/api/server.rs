use std::sync::Arc;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::post;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::errors::ApiError;
use super::handlers;
use crate::context::ExporterContext;

/// Route table for every HTTP endpoint the exporter serves. Split out of
/// [`ApiServer::run`] so tests can drive the routes without a socket.
pub fn build_routes(ctx: Arc<ExporterContext>) -> impl Endpoint {
    let metrics_path = ctx.metrics_path.clone();
    let exporter_metrics_path = ctx.exporter_metrics_path.clone();

    Route::new()
        .at("/write", post(handlers::write))
        .at("/api/v2/write", post(handlers::write))
        .at("/query", get(handlers::query).post(handlers::query))
        .at(
            "/api/v2/query",
            get(handlers::api_v2_query).post(handlers::api_v2_query),
        )
        .at("/ping", get(handlers::ping))
        .at("/health", get(handlers::health))
        .at(&metrics_path, get(handlers::metrics))
        .at(&exporter_metrics_path, get(handlers::exporter_metrics))
        .at("/", get(handlers::index))
        .data(ctx)
}

/// HTTP front end: write endpoints, scrape endpoints and the InfluxDB
/// compatibility surface.
pub struct ApiServer {
    ctx: Arc<ExporterContext>,
    listen_addr: String,
}

impl ApiServer {
    pub fn new(ctx: Arc<ExporterContext>, listen_addr: String) -> Self {
        Self { ctx, listen_addr }
    }

    /// Serve until the server fails or the token is cancelled.
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to bind or serve
    pub async fn run(self, token: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting HTTP server on {}", self.listen_addr);

        let app = build_routes(self.ctx).with(Tracing);
        let listener = TcpListener::bind(&self.listen_addr);
        let server = Server::new(listener);

        tokio::select! {
            result = server.run(app) => {
                match result {
                    Ok(()) => {
                        info!("HTTP server stopped normally");
                        Ok(())
                    }
                    Err(e) => {
                        error!("HTTP server failed: {e}");
                        Err(Report::new(ApiError::ServerError {
                            message: format!("Server failed: {e}"),
                        }))
                    }
                }
            }
            _ = token.cancelled() => {
                info!("HTTP server shutdown requested");
                Ok(())
            }
        }
    }
}
