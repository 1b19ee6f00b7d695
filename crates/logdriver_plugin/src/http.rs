use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use logdriver::LogDriver;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::protocol::{
    ActivateResponse, CapabilitiesResponse, PluginResponse, ProtocolError, ReadLogsRequest,
    StartLoggingRequest, StopLoggingRequest, LOG_STREAM_CONTENT_TYPE, MISSING_IMAGE_MESSAGE,
    PLUGIN_CONTENT_TYPE,
};

/// Routes for the plugin protocol. Every endpoint is a `POST`.
pub fn router(driver: Arc<LogDriver>) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate))
        .route("/LogDriver.StartLogging", post(start_logging))
        .route("/LogDriver.StopLogging", post(stop_logging))
        .route("/LogDriver.Capabilities", post(capabilities))
        .route("/LogDriver.ReadLogs", post(read_logs))
        .with_state(driver)
}

async fn activate() -> Response {
    plugin_json(ActivateResponse::default())
}

async fn start_logging(
    State(driver): State<Arc<LogDriver>>,
    body: Bytes,
) -> Result<Response, ProtocolError> {
    let request: StartLoggingRequest = parse_body(&body)?;
    if request.info.image_name().is_none() {
        return Ok(plugin_json(PluginResponse::error(MISSING_IMAGE_MESSAGE)));
    }

    let response = match driver.start_logging(&request.file, request.info).await {
        Ok(()) => PluginResponse::ok(),
        Err(err) => {
            error!(file = %request.file, error = %err, "start logging failed");
            PluginResponse::error(err.to_string())
        }
    };
    Ok(plugin_json(response))
}

async fn stop_logging(
    State(driver): State<Arc<LogDriver>>,
    body: Bytes,
) -> Result<Response, ProtocolError> {
    let request: StopLoggingRequest = parse_body(&body)?;
    if let Some(report) = driver.stop_logging(&request.file).await {
        debug!(
            file = %request.file,
            frames = report.frames,
            decode_errors = report.decode_errors,
            write_errors = report.write_errors,
            "session stopped"
        );
    }
    Ok(plugin_json(PluginResponse::ok()))
}

async fn capabilities(State(driver): State<Arc<LogDriver>>) -> Response {
    plugin_json(CapabilitiesResponse {
        cap: driver.capabilities(),
    })
}

async fn read_logs(
    State(driver): State<Arc<LogDriver>>,
    body: Bytes,
) -> Result<Response, ProtocolError> {
    let request: ReadLogsRequest = parse_body(&body)?;
    let stream = driver
        .read_logs(request.info, request.config)
        .await
        .inspect_err(|err| error!(error = %err, "read logs failed"))?;

    Ok((
        [(CONTENT_TYPE, LOG_STREAM_CONTENT_TYPE)],
        Body::from_stream(stream),
    )
        .into_response())
}

/// The runtime does not send `application/json`, so bodies are decoded by hand.
/// An empty body decodes as `{}`.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_slice(b"{}")?);
    }
    Ok(serde_json::from_slice(body)?)
}

fn plugin_json<T: Serialize>(body: T) -> Response {
    ([(CONTENT_TYPE, PLUGIN_CONTENT_TYPE)], Json(body)).into_response()
}
