use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error(transparent)]
    Store(#[from] rfctl_store::StoreError),

    #[error(transparent)]
    Registry(#[from] rfctl_registry::RegistryError),

    #[error(transparent)]
    Crypto(#[from] rfctl_crypto::CryptoError),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid or expired enrollment token")]
    InvalidOrExpiredToken,

    #[error("runner id already enrolled")]
    RunnerAlreadyEnrolled,

    #[error("re-enrollment token does not match runner id")]
    ReEnrollmentMismatch,

    #[error("runner not found")]
    RunnerNotFound,

    #[error("invalid provisioning key")]
    InvalidProvisioningKey,

    #[error(
        "key_id must contain only alphanumeric characters, hyphens, and underscores"
    )]
    InvalidKeyIdFormat,

    #[error("provisioning key id already exists")]
    KeyIdConflict,
}
