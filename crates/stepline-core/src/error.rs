// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for stepline-core.
//!
//! Provides a unified error type with stable error-code strings that the
//! HTTP layer maps onto response statuses:
//!
//! | Code | HTTP |
//! |------|------|
//! | `NOT_FOUND` | 404 (hides cross-tenant existence) |
//! | `LIMIT_EXCEEDED` | 429 with `Retry-After` |
//! | `TEMPLATE_NOT_FOUND` | 400 |
//! | `INVALID_INPUT` | 400 |
//! | `CONFLICT` | 409 |
//! | `STORAGE_ERROR` | 500 |

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during repository and worker operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// The resource does not exist under the caller's tenant scope.
    /// Deliberately indistinguishable from "owned by someone else".
    NotFound,

    /// Tenant admission rejected the operation.
    LimitExceeded {
        /// Runs currently counted against the ceiling.
        active: i64,
        /// The effective ceiling.
        limit: i64,
    },

    /// The named workflow template does not exist or has no steps.
    TemplateNotFound {
        /// The template name that was requested.
        template: String,
    },

    /// Input validation failed before any write.
    InvalidInput {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// The operation conflicts with the current state.
    Conflict {
        /// Human-readable reason.
        reason: String,
    },

    /// Database operation failed.
    Storage {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the stable error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            Self::TemplateNotFound { .. } => "TEMPLATE_NOT_FOUND",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Conflict { .. } => "CONFLICT",
            Self::Storage { .. } => "STORAGE_ERROR",
        }
    }

    /// Shorthand for a storage error with an operation label.
    pub fn storage(operation: &str, err: impl fmt::Display) -> Self {
        Self::Storage {
            operation: operation.to_string(),
            details: err.to_string(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::LimitExceeded { active, limit } => {
                write!(f, "max concurrent runs exceeded: active={} limit={}", active, limit)
            }
            Self::TemplateNotFound { template } => {
                write!(f, "workflow template not found: {}", template)
            }
            Self::InvalidInput { field, message } => {
                write!(f, "invalid input for '{}': {}", field, message)
            }
            Self::Conflict { reason } => write!(f, "conflict: {}", reason),
            Self::Storage { operation, details } => {
                write!(f, "storage error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound,
            other => CoreError::Storage {
                operation: "query".to_string(),
                details: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Storage {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

/// True when the error is a PostgreSQL unique-constraint violation (23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}
