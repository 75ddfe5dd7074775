use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ErrorKind};

/// The envelope every successful response is wrapped in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// A successful JSON response.
pub type Envelope<T> = Json<ApiResponse<T>>;

impl<T> ApiResponse<T> {
    /// Wrap `data` in a successful envelope.
    pub fn json(data: T) -> Envelope<T> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// The envelope every failed response is wrapped in.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: String) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code,
                kind: code.kind(),
                message,
            },
        }
    }
}
