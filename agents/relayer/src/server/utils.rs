use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::error::RelayerError;

pub type ServerResult<T> = Result<T, ServerErrorResponse>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    success: bool,
    #[serde(flatten)]
    body: &'a T,
}

/// Error reply, rendered as `{ "success": false, "error": .., "details": .. }`
#[derive(Clone, Debug, new)]
pub struct ServerErrorResponse {
    pub status_code: StatusCode,
    pub body: ServerErrorBody,
}

impl ServerErrorResponse {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ServerErrorBody {
                error: error.into(),
                details: None,
            },
        )
    }
}

impl From<RelayerError> for ServerErrorResponse {
    fn from(err: RelayerError) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ServerErrorBody {
                error: err.to_string(),
                details: err.details(),
            },
        )
    }
}

impl IntoResponse for ServerErrorResponse {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            success: false,
            body: &self.body,
        };
        (self.status_code, Json(envelope)).into_response()
    }
}

/// Success reply, with the fields of `T` next to `"success": true`
#[derive(Clone, Debug, new)]
pub struct ServerSuccessResponse<T> {
    pub body: T,
}

impl<T: Serialize> IntoResponse for ServerSuccessResponse<T> {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            success: true,
            body: &self.body,
        };
        (StatusCode::OK, Json(envelope)).into_response()
    }
}
