use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::context::ExporterContext;
use crate::normalizer::normalize_batch;
use crate::normalizer::Precision;
use crate::sample::unix_now_ns;

/// UDP ingestion front end. Each datagram is one self-contained batch at
/// nanosecond precision; a bad datagram is counted and dropped, never fatal.
pub struct UdpFrontEnd {
    ctx: Arc<ExporterContext>,
    max_payload: usize,
}

impl UdpFrontEnd {
    pub fn new(ctx: Arc<ExporterContext>, max_payload: usize) -> Self {
        Self { ctx, max_payload }
    }

    /// Receive loop. The socket is bound by the caller so that bind failures
    /// surface at startup; this loop only ever logs and continues.
    pub async fn run(self, socket: UdpSocket, token: CancellationToken) {
        let mut buf = vec![0u8; self.max_payload];
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("UDP listener task cancelled");
                    break;
                }
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, _peer)) => self.handle_datagram(&buf[..len]),
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to read UDP message");
                        }
                    }
                }
            }
        }
    }

    /// Parse and ingest one datagram. Parse failures (including non-UTF-8
    /// payloads) increment the parse-error counter and drop the datagram.
    pub fn handle_datagram(&self, payload: &[u8]) {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Error parsing udp packet");
                self.ctx.udp_parse_errors.inc();
                return;
            }
        };

        match normalize_batch(text, unix_now_ns(), Precision::Nanoseconds) {
            Ok(samples) => {
                tracing::debug!(samples = samples.len(), "Ingesting udp batch");
                self.ctx.store.ingest(samples);
            }
            Err(e) => {
                tracing::error!(error = %e, "Error parsing udp packet");
                self.ctx.udp_parse_errors.inc();
            }
        }
    }
}
