use thiserror::Error;

/// Failures raised by `rfctl-store` operations.
///
/// Every method returns an explicit `Result`/`Option` rather than panicking
///; `NoneAvailable` is not an error in the usual sense but the
/// expected "nothing to do right now" outcome of `assign_next_challenge`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no challenge is currently available for assignment")]
    NoneAvailable,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("stored config is not valid JSON: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] rfctl_model::ModelError),

    #[error(transparent)]
    Crypto(#[from] rfctl_crypto::CryptoError),
}
