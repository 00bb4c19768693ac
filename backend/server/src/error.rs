use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{accounts::ValidationError, auth::AuthError, store::StoreError};

#[derive(Error, Debug)]
pub enum GateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("Sole superuser is not the installer placeholder")]
    Inconsistency { found: String },

    #[error("Failed to {step}: {source}")]
    Store {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] argon2::password_hash::Error),

    #[error("Bootstrap gate busy")]
    Busy,
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] argon2::password_hash::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Initial admin registration is disabled")]
    RegistrationDisabled,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::RegistrationDisabled => StatusCode::FORBIDDEN,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Gate(gate) => match gate {
                GateError::Validation(_) => StatusCode::BAD_REQUEST,
                GateError::Conflict(_) => StatusCode::CONFLICT,
                GateError::Busy => StatusCode::SERVICE_UNAVAILABLE,
                GateError::Inconsistency { .. }
                | GateError::Store { .. }
                | GateError::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Auth(_) | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{self:?}");
        }

        let body = match &self {
            AppError::Gate(GateError::Validation(validation)) => {
                json!({ "error": self.to_string(), "field": validation.field() })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::MalformedPayload, StatusCode::BAD_REQUEST),
            (AppError::RegistrationDisabled, StatusCode::FORBIDDEN),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (
                GateError::Validation(ValidationError::MissingEmail).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                GateError::Conflict("users already exist").into(),
                StatusCode::CONFLICT,
            ),
            (
                GateError::Inconsistency {
                    found: "x@y.com".to_string(),
                }
                .into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GateError::Store {
                    step: "count users",
                    source: StoreError::Aborted("down".to_string()),
                }
                .into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (GateError::Busy.into(), StatusCode::SERVICE_UNAVAILABLE),
            (AuthError::Encode.into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }

    #[test]
    fn test_signer_failure_is_not_a_bad_token() {
        let error = AppError::from(AuthError::Encode);

        assert_eq!(error.to_string(), "Failed to encode token claims");
        assert_ne!(AuthError::Encode, AuthError::Malformed);
    }

    #[test]
    fn test_store_error_names_step() {
        let error = GateError::Store {
            step: "commit bootstrap transaction",
            source: StoreError::Aborted("boom".to_string()),
        };

        assert_eq!(
            error.to_string(),
            "Failed to commit bootstrap transaction: Transaction aborted: boom"
        );
    }
}
