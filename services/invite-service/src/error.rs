//! Control API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::info;

/// Errors surfaced by control API handlers.
///
/// Only malformed requests leave as a transport-level error. A well-formed
/// request the scheduler turns down is answered 200 in the endpoint's own body
/// shape (`{message}`, `{error}`, `{success: false}`); see `rejection`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });
        (self.status(), axum::Json(body)).into_response()
    }
}

/// Log label for a scheduler rejection.
fn rejection_kind(err: &invite_pool::Error) -> &'static str {
    use invite_pool::Error as E;
    match err {
        E::Invalid(_) => "validation_error",
        E::AccountNotFound(_) => "not_found",
        E::AlreadyRunning => "already_running",
        E::NoAccountsSelected => "no_accounts_selected",
        E::NoEligibleAccount(_) => "no_eligible_account",
        E::RateLimited { .. } => "rate_limited",
        E::Rejected(_) => "rejected",
        E::Transient(_) | E::AccountUnusable { .. } | E::Provider(_) => "provider_error",
    }
}

/// Split a scheduler error into the text of a rejection body, or a validation
/// error when the request itself was malformed.
pub fn rejection(err: invite_pool::Error) -> Result<String, ApiError> {
    match err {
        invite_pool::Error::Invalid(reason) => Err(ApiError::Validation(reason)),
        other => {
            info!(kind = rejection_kind(&other), error = %other, "request rejected");
            Ok(other.to_string())
        }
    }
}
