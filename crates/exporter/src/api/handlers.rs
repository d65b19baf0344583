use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use poem::handler;
use poem::http::StatusCode;
use poem::web::Data;
use poem::web::Html;
use poem::web::Json;
use poem::web::Query;
use poem::Body;
use poem::IntoResponse;
use poem::Request;
use poem::Response;
use prometheus::Encoder;
use prometheus::Registry;
use prometheus::TextEncoder;
use serde::Deserialize;
use serde::Serialize;

use crate::context::ExporterContext;
use crate::normalizer::normalize_batch;
use crate::normalizer::Precision;
use crate::sample::unix_now_ns;

/// JSON error body shape shared by every failing write response.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    #[serde(rename = "Error")]
    error: String,
}

/// InfluxDB v2 health response shape.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InfluxV2Health {
    checks: Vec<serde_json::Value>,
    commit: String,
    message: String,
    name: String,
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteQuery {
    precision: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PingQuery {
    verbose: Option<String>,
}

fn json_error_response(message: String, status: StatusCode) -> Response {
    let body = serde_json::to_string(&ErrorResponse { error: message })
        .unwrap_or_else(|_| r#"{"Error":"failed to encode error"}"#.to_string());
    Response::builder()
        .status(status)
        .content_type("application/json; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(body)
}

/// `POST /write` and `POST /api/v2/write`.
///
/// The last-push gauge is updated before anything is read, so a garbage body
/// still counts as a push attempt. Read/decompress failures are 500s, parse
/// failures 400s, both with a JSON error body; success is an empty 204.
#[handler]
pub async fn write(
    req: &Request,
    body: Body,
    Query(params): Query<WriteQuery>,
    Data(ctx): Data<&Arc<ExporterContext>>,
) -> Response {
    ctx.last_push.set(unix_now_ns() as f64 / 1e9);

    let raw = match body.into_vec().await {
        Ok(raw) => raw,
        Err(e) => {
            return json_error_response(
                format!("error reading body: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    };

    let gzipped = req
        .headers()
        .get("Content-Encoding")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("gzip"));
    let buf = if gzipped {
        let mut decompressed = Vec::new();
        match GzDecoder::new(raw.as_slice()).read_to_end(&mut decompressed) {
            Ok(_) => decompressed,
            Err(e) => {
                return json_error_response(
                    format!("error decompressing data: {e}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    } else {
        raw
    };

    let text = match String::from_utf8(buf) {
        Ok(text) => text,
        Err(e) => {
            return json_error_response(format!("error parsing request: {e}"), StatusCode::BAD_REQUEST)
        }
    };

    let precision = match params.precision.as_deref() {
        None | Some("") => Precision::Nanoseconds,
        Some(value) => match Precision::parse(value) {
            Some(precision) => precision,
            None => {
                return json_error_response(
                    format!("error parsing request: invalid precision {value:?}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        },
    };

    match normalize_batch(&text, unix_now_ns(), precision) {
        Ok(samples) => {
            tracing::debug!(samples = samples.len(), "Ingesting http batch");
            ctx.store.ingest(samples);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => json_error_response(format!("error parsing request: {e}"), StatusCode::BAD_REQUEST),
    }
}

/// `GET <metrics-path>`: the ingested sample set.
#[handler]
pub async fn metrics(Data(ctx): Data<&Arc<ExporterContext>>) -> Response {
    render_registry(&ctx.registry)
}

/// `GET <exporter-metrics-path>`: process-level self metrics only.
#[handler]
pub async fn exporter_metrics(Data(ctx): Data<&Arc<ExporterContext>>) -> Response {
    render_registry(&ctx.exporter_registry)
}

fn render_registry(registry: &Registry) -> Response {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    match encoder.encode(&registry.gather(), &mut buf) {
        Ok(()) => Response::builder()
            .content_type(encoder.format_type())
            .body(buf),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            json_error_response(
                format!("error encoding metrics: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

/// `GET /ping`: 204 with the version header, or a JSON version body when the
/// `verbose` parameter asks for it.
#[handler]
pub async fn ping(Query(params): Query<PingQuery>) -> Response {
    let verbose = params.verbose.as_deref().unwrap_or("");
    if !verbose.is_empty() && verbose != "0" && verbose != "false" {
        Json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") })).into_response()
    } else {
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("X-Influxdb-Version", env!("CARGO_PKG_VERSION"))
            .finish()
    }
}

/// `GET /health`: static InfluxDB-v2-shaped health document.
#[handler]
pub async fn health() -> Json<InfluxV2Health> {
    Json(InfluxV2Health {
        checks: Vec::new(),
        commit: String::new(),
        message: String::new(),
        name: String::new(),
        status: "pass".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET|POST /query`: no query language, always an empty result set.
#[handler]
pub async fn query() -> Response {
    Response::builder()
        .content_type("application/json")
        .body(r#"{"results": []}"#)
}

/// `GET|POST /api/v2/query`: intentionally empty.
#[handler]
pub async fn api_v2_query() -> Response {
    Response::builder().finish()
}

/// `GET /`: informational landing page.
#[handler]
pub async fn index(Data(ctx): Data<&Arc<ExporterContext>>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>InfluxDB Exporter</title></head>\n<body>\n<h1>InfluxDB Exporter</h1>\n\
         <p><a href=\"{}\">Metrics</a></p>\n<p><a href=\"{}\">Exporter Metrics</a></p>\n</body>\n</html>",
        ctx.metrics_path, ctx.exporter_metrics_path
    ))
}
