use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("frequency_ranges must not be empty")]
    EmptyFrequencyRanges,

    #[error("unknown frequency range name: {0}")]
    UnknownFrequencyRange(String),
}
