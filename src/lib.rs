//! Storefront Commerce Platform
//!
//! Self-hosted storefront backend exposed as a JSON API.
//!
//! ## Features
//! - Product catalogue with stock control
//! - Per-customer shopping carts
//! - Discount coupons with atomic redemption
//! - Order lifecycle with explicit status transitions
//! - Payment transactions and refunds
//! - Outbox-driven order notifications

pub mod config;
pub mod domain;
pub mod http;
pub mod notifications;
pub mod repository;
pub mod services;

use sqlx::error::ErrorKind;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Storage error: {0}")]
    Storage(#[source] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for CommerceError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::NotFound("Record not found".to_string());
        }

        match error.as_database_error().map(|e| e.kind()) {
            Some(ErrorKind::UniqueViolation) => Self::Conflict("Resource already exists".to_string()),
            Some(ErrorKind::ForeignKeyViolation) => {
                Self::BadRequest("Referenced resource does not exist".to_string())
            }
            Some(ErrorKind::CheckViolation) | Some(ErrorKind::NotNullViolation) => {
                Self::BadRequest("Invalid data".to_string())
            }
            _ => Self::Storage(error),
        }
    }
}

pub type Result<T> = std::result::Result<T, CommerceError>;
