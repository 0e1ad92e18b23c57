use thiserror::Error;

/// Validation and contract errors exposed by `reconflux-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("target cannot be empty")]
    EmptyTarget,
    #[error("target length {len} exceeds max {max}")]
    TargetTooLong { len: usize, max: usize },
    #[error("target contains invalid character '{ch}' at index {index}")]
    TargetInvalidChar { ch: char, index: usize },

    #[error("invalid source '{value}', expected one of shodan, censys, virustotal, hunter, whois, crtsh")]
    InvalidSource { value: String },
    #[error("source list cannot be empty")]
    EmptySourceList,
}
