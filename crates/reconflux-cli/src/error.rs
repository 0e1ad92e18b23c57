use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Request(String),

    #[error("invalid JSON value: {0}")]
    InvalidJson(serde_json::Error),

    #[error("key '{0}' not found in store")]
    KeyNotFound(String),

    #[error(transparent)]
    Store(#[from] reconflux_store::StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Request(_) | Self::InvalidJson(_) => 2,
            Self::KeyNotFound(_) => 2,
            Self::Serialization(_) => 4,
            Self::Store(_) => 6,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_exit_with_two() {
        assert_eq!(CliError::Request(String::from("bad")).exit_code(), 2);
        assert_eq!(CliError::KeyNotFound(String::from("x")).exit_code(), 2);
        assert_eq!(
            CliError::Store(reconflux_store::StoreError::KeyNotFound(String::from("x"))).exit_code(),
            6
        );
    }
}
