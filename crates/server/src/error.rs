use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use rfctl_assignment::AssignmentError;
use rfctl_auth::AuthError;
use rfctl_enrollment::EnrollmentError;
use rfctl_registry::RegistryError;
use rfctl_store::StoreError;

/// The HTTP-facing error taxonomy: a *kind*, not a type, per failure.
/// Every downstream crate's error enum collapses into one of these.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    AuthMissing,

    #[error("invalid credentials")]
    AuthInvalid,

    #[error("permission denied")]
    PermissionDenied,

    #[error("csrf token mismatch")]
    CsrfDenied,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::AuthMissing | Self::AuthInvalid => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied | Self::CsrfDenied => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited {.. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(source) = &self {
            error!(error = %source, "internal error");
        }

        let status = self.status();
        let body = ErrorBody {
            error: match &self {
                // Undistinguished on purpose: prevents enumeration of
                // which of username/password/TOTP/session/host-binding failed.
                Self::AuthInvalid => "invalid credentials".to_owned(),
                Self::Internal(_) => "internal error".to_owned(),
                other => other.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(kind) => Self::NotFound(kind),
            StoreError::Conflict(kind) => Self::Conflict(format!("{kind} already exists")),
            StoreError::NoneAvailable => Self::NotFound("challenge"),
            StoreError::Model(model_err) => Self::Validation(model_err.to_string()),
            other => Self::Internal(Box::new(other)),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::SessionNotFound
            | AuthError::SessionExpired
            | AuthError::TotpRequired
            | AuthError::InvalidTotpCode
            | AuthError::TotpReplay => Self::AuthInvalid,
            AuthError::RateLimited(d) => Self::RateLimited { retry_after_secs: d.as_secs()},
            AuthError::CsrfMismatch => Self::CsrfDenied,
            AuthError::PermissionDenied(_) | AuthError::SelfPermissionChange => {
                Self::PermissionDenied
            }
            AuthError::NoPendingSetup | AuthError::PendingSetupExpired => {
                Self::Validation("no pending setup for this session".to_owned())
            }
            AuthError::NotTemporaryUser => {
                Self::Validation("user is not in the temporary/setup state".to_owned())
            }
            AuthError::PasswordTooShort => {
                Self::Validation("password must be at least 8 characters".to_owned())
            }
            AuthError::Store(store_err) => store_err.into(),
            AuthError::Crypto(crypto_err) => Self::Internal(Box::new(crypto_err)),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Store(store_err) => store_err.into(),
            RegistryError::Crypto(crypto_err) => Self::Internal(Box::new(crypto_err)),
        }
    }
}

impl From<EnrollmentError> for ApiError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::Store(store_err) => store_err.into(),
            EnrollmentError::Registry(registry_err) => registry_err.into(),
            EnrollmentError::Crypto(crypto_err) => Self::Internal(Box::new(crypto_err)),
            EnrollmentError::MissingField(field) => {
                Self::Validation(format!("missing required field: {field}"))
            }
            EnrollmentError::InvalidOrExpiredToken => Self::AuthInvalid,
            EnrollmentError::RunnerAlreadyEnrolled => {
                Self::Conflict("runner already enrolled".to_owned())
            }
            EnrollmentError::ReEnrollmentMismatch => {
                Self::Validation("re-enrollment token does not match runner id".to_owned())
            }
            EnrollmentError::RunnerNotFound => Self::NotFound("runner"),
            EnrollmentError::InvalidProvisioningKey => Self::AuthInvalid,
            EnrollmentError::InvalidKeyIdFormat => Self::Validation(e.to_string()),
            EnrollmentError::KeyIdConflict => {
                Self::Conflict("provisioning key id already exists".to_owned())
            }
        }
    }
}

impl From<AssignmentError> for ApiError {
    fn from(e: AssignmentError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}
