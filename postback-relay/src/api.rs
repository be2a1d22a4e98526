use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Body returned to the attribution provider on a fully delivered postback.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub success: bool,
    pub event: String,
    pub distinct_id: String,
    pub aliased: bool,
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("no payload")]
    NoPayload,
    #[error("malformed payload")]
    MalformedPayload,
    #[error("no user identifier")]
    NoUserIdentifier,

    #[error("ingestion credential is not configured")]
    MissingCredential,

    #[error("delivery failed after {attempts} attempts: {cause}")]
    DeliveryFailed { attempts: u32, cause: String },
}

impl RelayError {
    /// Validation errors are terminal before any outbound call is made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RelayError::NoPayload | RelayError::MalformedPayload | RelayError::NoUserIdentifier
        )
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            RelayError::NoPayload | RelayError::MalformedPayload | RelayError::NoUserIdentifier => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() })))
            }

            RelayError::MissingCredential => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": self.to_string() })),
            ),

            RelayError::DeliveryFailed { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": self.to_string() })),
            ),
        }
        .into_response()
    }
}
