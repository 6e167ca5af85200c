//! HTTP response types for Leasekeeper server

use actix_web::{HttpResponse, HttpResponseBuilder, http::StatusCode};
use serde::{Deserialize, Serialize};

use leasekeeper_common::{AppError, ErrorCode, LeaseError};
use leasekeeper_common::error::SUCCESS;

/// Generic result wrapper for API responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Result<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

impl<T> Result<T> {
    pub fn new(code: i32, message: String, data: T) -> Self {
        Result::<T> {
            code,
            message,
            data,
        }
    }

    pub fn success(data: T) -> Result<T> {
        Result::<T> {
            code: SUCCESS.code,
            message: SUCCESS.message.to_string(),
            data,
        }
    }

    pub fn http_success(data: impl Serialize) -> HttpResponse {
        HttpResponse::Ok().json(Result::success(data))
    }

    pub fn http_response(
        status: u16,
        code: i32,
        message: String,
        data: impl Serialize,
    ) -> HttpResponse {
        HttpResponseBuilder::new(StatusCode::from_u16(status).unwrap_or_default())
            .json(Result::new(code, message, data))
    }

    /// Error response for `code`, with the message taken from the error
    pub fn http_error(status: u16, code: &ErrorCode<'_>, message: impl Into<String>) -> HttpResponse {
        Result::<()>::http_response(status, code.code, message.into(), ())
    }
}

/// HTTP status for an engine error
pub fn status_of(error: &LeaseError) -> u16 {
    match error {
        LeaseError::LeaseNotFound(_) => 404,
        LeaseError::DuplicateLease(_) | LeaseError::InvalidTransition { .. } => 409,
        LeaseError::IllegalArgument(_) => 400,
        LeaseError::Persistence(_) => 503,
        _ => 500,
    }
}

/// Error response for any application error
pub fn error_response(error: impl Into<AppError>) -> HttpResponse {
    let error = error.into();
    let status = error.downcast_ref::<LeaseError>().map(status_of).unwrap_or(500);
    Result::<()>::http_error(status, &error.error_code(), error.to_string())
}
