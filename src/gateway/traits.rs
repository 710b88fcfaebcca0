//! Webhook pipeline outcomes and their JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// How a request that passed authentication ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Delivered,
    Ignored(&'static str),
}

/// Why a request did not complete.
#[derive(Debug)]
pub enum WebhookError {
    /// Expected refusal (bad path, unknown agent, auth, allow-list, payload).
    /// Answered with `status`; never dead-lettered.
    Rejected { status: StatusCode, message: String },
    /// Pipeline failure after the request was accepted. Answered with 502
    /// and dead-lettered.
    Failed(anyhow::Error),
}

impl WebhookError {
    pub fn rejected(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for WebhookError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(err)
    }
}

/// Render a pipeline result. Every body carries `traceId`.
pub fn render(result: &Result<WebhookOutcome, WebhookError>, trace_id: &str) -> Response {
    match result {
        Ok(WebhookOutcome::Delivered) => Json(json!({"ok": true, "traceId": trace_id})).into_response(),
        Ok(WebhookOutcome::Ignored(reason)) => Json(json!({
            "ok": true,
            "ignored": true,
            "reason": reason,
            "traceId": trace_id,
        }))
        .into_response(),
        Err(WebhookError::Rejected { status, message }) => (
            *status,
            Json(json!({"ok": false, "error": message, "traceId": trace_id})),
        )
            .into_response(),
        Err(WebhookError::Failed(err)) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"ok": false, "error": err.to_string(), "traceId": trace_id})),
        )
            .into_response(),
    }
}
