use thiserror::Error;

/// Validation failures raised while constructing or normalizing model values.
///
/// Kept separate from the HTTP-facing error taxonomy so this crate has no
/// dependency on a web framework; `rfctl-server` maps these onto
/// `ApiError::Validation`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("conflicting frequency specification: {0}")]
    ConflictingFrequencySpec(&'static str),

    #[error("min_delay ({min}) must be <= max_delay ({max})")]
    DelayOrder { min: u64, max: u64 },

    #[error("unknown frequency range name: {0}")]
    UnknownFrequencyRange(String),

    #[error("frequency_ranges must not be empty")]
    EmptyFrequencyRanges,

    #[error("password must be at least 8 characters")]
    PasswordTooShort,
}
