//! JSON error bodies for the gateway.

use crate::error::EvoError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Value, json};

pub const API_VERSION: &str = "4.0";

/// A failed request, rendered as
/// `{success: false, error, debug_info{details?, timestamp}, api_version}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

impl ApiError {
    /// Wrap a pipeline error. Outside production the debug rendering is
    /// attached as `debug_info.details`.
    pub fn from_evo(error: &EvoError, production: bool) -> Self {
        let status = StatusCode::from_u16(error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            message: error.to_string(),
            details: (!production).then(|| format!("{error:?}")),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn body(&self) -> Value {
        let mut debug_info = json!({ "timestamp": Utc::now().to_rfc3339() });
        if let Some(details) = &self.details {
            debug_info["details"] = Value::String(details.clone());
        }
        json!({
            "success": false,
            "error": self.message,
            "debug_info": debug_info,
            "api_version": API_VERSION,
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

/// 405 body listing the methods the route accepts.
pub fn method_not_allowed(allowed: &[&str]) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": "Method not allowed",
            "allowed_methods": allowed,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;

    #[test]
    fn test_status_follows_error_kind() {
        let err = EvoError::validation("Question is required for ask_truth");
        assert_eq!(ApiError::from_evo(&err, true).status(), StatusCode::BAD_REQUEST);

        let err = EvoError::Authorization(AuthError::InsufficientPermission {
            permission: "encrypt".into(),
        });
        assert_eq!(ApiError::from_evo(&err, true).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_details_hidden_in_production() {
        let err = EvoError::validation("bad");
        let body = ApiError::from_evo(&err, true).body();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "bad");
        assert_eq!(body["api_version"], API_VERSION);
        assert!(body["debug_info"]["timestamp"].is_string());
        assert!(body["debug_info"].get("details").is_none());

        let body = ApiError::from_evo(&err, false).body();
        assert!(body["debug_info"]["details"].as_str().unwrap().contains("Validation"));
    }
}
