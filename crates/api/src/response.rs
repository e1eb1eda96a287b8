//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine::IngestReceipt;
use resq_core::{EmergencyEvent, QualityScore, SessionStatus};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Response to an ingested sample.
///
/// An out-of-order sample that raised an SOS comes back with
/// `accepted: false`, no score and the SOS in `events`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: bool,
    pub score: Option<QualityScore>,
    pub session_id: Option<String>,
    pub session_status: Option<SessionStatus>,
    pub events: Vec<EmergencyEvent>,
    /// Rejection code when not accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IngestResponse {
    /// 200 for an accepted sample, 409 for an out-of-order one.
    pub fn status(&self) -> StatusCode {
        if self.accepted {
            StatusCode::OK
        } else {
            StatusCode::CONFLICT
        }
    }
}

impl From<IngestReceipt> for IngestResponse {
    fn from(receipt: IngestReceipt) -> Self {
        Self {
            accepted: receipt.accepted,
            score: receipt.score,
            session_id: receipt.session.as_ref().map(|s| s.session_id.to_string()),
            session_status: receipt.session.as_ref().map(|s| s.status),
            events: receipt.events,
            code: (!receipt.accepted).then(|| "SEQ_001".to_string()),
        }
    }
}

impl IntoResponse for IngestResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store_connected: bool,
    pub auth_connected: bool,
    pub active_devices: usize,
    pub persist_queue_depth: u64,
}

/// Plain acknowledgement for writes.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error carrying a status and an error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "VALID_004", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<resq_core::Error> for ApiError {
    fn from(err: resq_core::Error) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let Some(code) = err.error_code() else {
            return match err {
                resq_core::Error::DeviceUnavailable(_) => {
                    ApiError::with_code(status, "UNAVAILABLE", err.to_string())
                }
                resq_core::Error::Serialization(e) => ApiError::bad_request(e.to_string()),
                other => {
                    error!(error = %other, "Internal error");
                    ApiError::internal("Internal server error")
                }
            };
        };

        let mut api_error = ApiError::with_code(status, code, err.to_string());
        if let resq_core::Error::InvalidSample {
            field: Some(field), ..
        } = &err
        {
            api_error.response = api_error.response.with_details(vec![field.clone()]);
        }
        api_error
    }
}
