//! Error taxonomy shared by every importer

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

/// Coarse classification of an [`ImportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnavailable,
    DataFormat,
    InvalidRequest,
    EmptyResult,
    Local,
}

/// Error returned by importer operations.
///
/// `provider` is the human-readable source name ("World Bank", "CEPII BACI", ...).
/// Messages carry the requested parameters so a failure can be reproduced.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Network, timeout or HTTP failure after the retry budget was spent.
    #[error("{provider}: source unavailable: {message}")]
    SourceUnavailable {
        provider: &'static str,
        message: String,
    },
    /// Payload does not have the expected shape (upstream layout change).
    #[error("{provider}: unexpected data format: {message}")]
    DataFormat {
        provider: &'static str,
        message: String,
    },
    /// Caller parameters outside the documented domain. No request was made.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The request succeeded but nothing matched.
    #[error("{provider}: no data for {message}")]
    EmptyResult {
        provider: &'static str,
        message: String,
    },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet: {0}")]
    Parquet(#[from] ParquetError),
}

pub type Result<T, E = ImportError> = std::result::Result<T, E>;

impl ImportError {
    pub fn unavailable(provider: &'static str, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            provider,
            message: message.into(),
        }
    }

    pub fn format(provider: &'static str, message: impl Into<String>) -> Self {
        Self::DataFormat {
            provider,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn empty(provider: &'static str, message: impl Into<String>) -> Self {
        Self::EmptyResult {
            provider,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::DataFormat { .. } => ErrorKind::DataFormat,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::EmptyResult { .. } => ErrorKind::EmptyResult,
            Self::Io(_) | Self::Arrow(_) | Self::Parquet(_) => ErrorKind::Local,
        }
    }

    /// Whether calling again later might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind as IoKind;

    #[test]
    fn display_names_provider() {
        let err = ImportError::format("UNDP HDI", "missing column 'iso3'");
        assert_eq!(
            format!("{err}"),
            "UNDP HDI: unexpected data format: missing column 'iso3'"
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(
            ImportError::unavailable("WHO GHED", "timeout").kind(),
            ErrorKind::SourceUnavailable
        );
        assert_eq!(ImportError::invalid("bad year").kind(), ErrorKind::InvalidRequest);
        assert_eq!(
            ImportError::empty("World Bank", "NY.GDP.MKTP.CD").kind(),
            ErrorKind::EmptyResult
        );
        let io = ImportError::from(std::io::Error::new(IoKind::NotFound, "gone"));
        assert_eq!(io.kind(), ErrorKind::Local);
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(ImportError::unavailable("IMF WEO", "503").is_transient());
        assert!(!ImportError::format("IMF WEO", "no header").is_transient());
        assert!(!ImportError::invalid("month").is_transient());
    }
}
