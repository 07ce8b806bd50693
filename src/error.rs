use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::tools::ToolName;

pub type Result<T> = std::result::Result<T, PortfolioError>;

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing API key: set {0} to enable the chat endpoint")]
    MissingApiKey(String),

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request took longer than {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Unknown tool requested by the model: {0}")]
    UnknownTool(String),

    #[error("A tool call is still in flight ({0})")]
    SessionBusy(ToolName),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for PortfolioError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // Timeouts are reported as generic failures, not network ones.
            PortfolioError::Internal(format!("request timed out: {e}"))
        } else if e.is_connect() || e.is_request() {
            PortfolioError::Network(e.to_string())
        } else if let Some(status) = e.status() {
            PortfolioError::Provider {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            PortfolioError::Internal(e.to_string())
        }
    }
}

/// How a failed model exchange is presented to the visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    QuotaExceeded,
    Network,
    Generic,
}

impl FailureKind {
    /// Classify by HTTP status and message text. Quota wins over network.
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        let lower = message.to_lowercase();
        if status == Some(429)
            || lower.contains("quota")
            || lower.contains("exceeded")
            || lower.contains("429")
        {
            FailureKind::QuotaExceeded
        } else if status == Some(503) || lower.contains("network") {
            FailureKind::Network
        } else {
            FailureKind::Generic
        }
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            FailureKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            FailureKind::Network => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::Generic => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl PortfolioError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PortfolioError::Provider { status, message } => {
                FailureKind::classify(Some(*status), message)
            }
            PortfolioError::Network(_) => FailureKind::Network,
            PortfolioError::Timeout(_) | PortfolioError::MissingApiKey(_) => FailureKind::Generic,
            other => FailureKind::classify(None, &other.to_string()),
        }
    }

    /// Plain-text body sent back by `POST /api/chat`.
    pub fn response_body(&self) -> String {
        match self.failure_kind() {
            FailureKind::QuotaExceeded => "API quota exceeded. Please try again later.".to_string(),
            FailureKind::Network => {
                "Network error. Please check your connection and try again.".to_string()
            }
            FailureKind::Generic => match self {
                PortfolioError::MissingApiKey(_) => self.to_string(),
                other => format!("Internal Server Error: {other}"),
            },
        }
    }
}

impl IntoResponse for PortfolioError {
    fn into_response(self) -> Response {
        let status = self.failure_kind().status_code();
        tracing::error!(%status, error = %self, "chat request failed");
        (status, self.response_body()).into_response()
    }
}
