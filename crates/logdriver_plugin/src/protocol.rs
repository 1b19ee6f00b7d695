//! Request and response bodies of the log-driver plugin protocol.
//!
//! Field names follow the runtime's PascalCase JSON.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logdriver::{Capabilities, DriverError, ReadConfig, WorkloadLogContext};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1+json";
pub const LOG_STREAM_CONTENT_TYPE: &str = "application/x-json-stream";
pub const MISSING_IMAGE_MESSAGE: &str = "must provide container image name in log context";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartLoggingRequest {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub info: WorkloadLogContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopLoggingRequest {
    #[serde(default)]
    pub file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadLogsRequest {
    #[serde(default)]
    pub info: WorkloadLogContext,
    #[serde(default)]
    pub config: ReadConfig,
}

/// Reply to lifecycle calls. An empty `Err` means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResponse {
    #[serde(rename = "Err")]
    pub err: String,
}

impl PluginResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilitiesResponse {
    #[serde(rename = "Cap")]
    pub cap: Capabilities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateResponse {
    #[serde(rename = "Implements")]
    pub implements: Vec<String>,
}

impl Default for ActivateResponse {
    fn default() -> Self {
        Self {
            implements: vec!["LogDriver".to_owned()],
        }
    }
}

/// Failures that end a request with a non-200 status and a plain-text body.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{0}")]
    BadRequest(#[from] serde_json::Error),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ProtocolError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        (self.status(), format!("{self}\n")).into_response()
    }
}
