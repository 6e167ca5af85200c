//! Error types and error codes for Leasekeeper
//!
//! This module defines:
//! - `LeaseError`: the lease engine's error taxonomy
//! - `AppError`: Wrapper for integration with web frameworks
//! - `ErrorCode`: Structured error codes for API responses

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::status::LeaseStatus;

/// Lease engine error types
#[derive(thiserror::Error, Debug)]
pub enum LeaseError {
    #[error("lease '{0}' already exists")]
    DuplicateLease(String),

    #[error("lease '{reference}' cannot move from {from} to {to}")]
    InvalidTransition {
        reference: String,
        from: LeaseStatus,
        to: LeaseStatus,
    },

    #[error("lease '{0}' not found")]
    LeaseNotFound(String),

    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("provision error: {0}")]
    Provision(String),

    #[error("destroy error: {0}")]
    Destroy(String),

    #[error("acquire budget exceeded: {elapsed} ticks elapsed, limit {limit}")]
    BudgetExceeded { elapsed: u64, limit: u64 },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LeaseError {
    pub fn persistence(err: anyhow::Error) -> Self {
        LeaseError::Persistence(format!("{:#}", err))
    }

    pub fn provision(err: anyhow::Error) -> Self {
        LeaseError::Provision(format!("{:#}", err))
    }

    pub fn destroy(err: anyhow::Error) -> Self {
        LeaseError::Destroy(format!("{:#}", err))
    }

    pub fn notification(err: anyhow::Error) -> Self {
        LeaseError::Notification(format!("{:#}", err))
    }

    /// Error code reported to API clients for this error
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            LeaseError::DuplicateLease(_) => LEASE_ALREADY_EXISTS,
            LeaseError::InvalidTransition { .. } => LEASE_INVALID_TRANSITION,
            LeaseError::LeaseNotFound(_) => LEASE_NOT_FOUND,
            LeaseError::IllegalArgument(_) => PARAMETER_VALIDATE_ERROR,
            LeaseError::Provision(_) | LeaseError::Destroy(_) => PROVISIONER_ERROR,
            LeaseError::BudgetExceeded { .. } => ACQUIRE_TIMEOUT,
            LeaseError::Persistence(_) => DATA_ACCESS_ERROR,
            LeaseError::Notification(_) | LeaseError::Config(_) => SERVER_ERROR,
        }
    }
}

/// Wrapper for application errors
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl From<LeaseError> for AppError {
    fn from(value: LeaseError) -> Self {
        AppError {
            inner: anyhow::Error::new(value),
        }
    }
}

impl AppError {
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn error_code(&self) -> ErrorCode<'static> {
        self.downcast_ref::<LeaseError>()
            .map(LeaseError::error_code)
            .unwrap_or(SERVER_ERROR)
    }
}

/// Error code structure for API responses
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const LEASE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 22000,
    message: "lease not found",
};

pub const LEASE_ALREADY_EXISTS: ErrorCode<'static> = ErrorCode {
    code: 22001,
    message: "lease already exists",
};

pub const LEASE_INVALID_TRANSITION: ErrorCode<'static> = ErrorCode {
    code: 22002,
    message: "lease status transition not permitted",
};

pub const ACQUIRE_TIMEOUT: ErrorCode<'static> = ErrorCode {
    code: 22003,
    message: "lease acquisition timed out",
};

pub const PROVISIONER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 22004,
    message: "provisioner error",
};

pub const EVENT_QUEUE_CLOSED: ErrorCode<'static> = ErrorCode {
    code: 22005,
    message: "lease event queue closed",
};

pub const SERVER_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "server error",
};
