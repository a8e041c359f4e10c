use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`SplitError`].
///
/// Drivers branch on the kind rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or unreadable source, unknown format identifier
    InvalidInput,
    /// Every cell on every page was classified as blank
    AllLabelsBlank,
    /// Rasterizing a cell failed for a reason other than an empty clip
    RenderFailure,
    /// The source could not be read or the destination could not be written
    IoFailure,
}

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown label format: {0} (expected one of: 6up, 45up)")]
    UnknownFormat(String),

    #[error("No non-blank labels detected")]
    AllLabelsBlank,

    #[error("Failed to render label at page {page}, row {row}, column {col}: {reason}")]
    RenderFailure {
        page: usize,
        row: u32,
        col: u32,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

impl SplitError {
    /// The error kind drivers should branch on
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitError::SourceNotFound(_)
            | SplitError::InvalidInput(_)
            | SplitError::UnknownFormat(_) => ErrorKind::InvalidInput,
            SplitError::AllLabelsBlank => ErrorKind::AllLabelsBlank,
            SplitError::RenderFailure { .. } => ErrorKind::RenderFailure,
            SplitError::Io(_) | SplitError::Pdf(_) => ErrorKind::IoFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind as IoErrorKind};

    #[test]
    fn test_split_error_display() {
        let error = SplitError::UnknownFormat("12up".to_string());
        assert_eq!(
            error.to_string(),
            "Unknown label format: 12up (expected one of: 6up, 45up)"
        );
        assert_eq!(
            SplitError::AllLabelsBlank.to_string(),
            "No non-blank labels detected"
        );
    }

    #[test]
    fn test_render_failure_display() {
        let error = SplitError::RenderFailure {
            page: 2,
            row: 1,
            col: 0,
            reason: "bad stream".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("page 2"));
        assert!(message.contains("row 1"));
        assert!(message.contains("bad stream"));
    }

    #[test]
    fn test_split_error_from_io_error() {
        let io_error = IoError::new(IoErrorKind::PermissionDenied, "access denied");
        let error = SplitError::from(io_error);

        match error {
            SplitError::Io(ref err) => assert_eq!(err.kind(), IoErrorKind::PermissionDenied),
            _ => panic!("Expected IO error variant"),
        }
        assert_eq!(error.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_error_kinds() {
        let cases = vec![
            (
                SplitError::SourceNotFound(PathBuf::from("missing.pdf")),
                ErrorKind::InvalidInput,
            ),
            (
                SplitError::InvalidInput("empty path".to_string()),
                ErrorKind::InvalidInput,
            ),
            (
                SplitError::UnknownFormat("x".to_string()),
                ErrorKind::InvalidInput,
            ),
            (SplitError::AllLabelsBlank, ErrorKind::AllLabelsBlank),
            (
                SplitError::RenderFailure {
                    page: 0,
                    row: 0,
                    col: 0,
                    reason: String::new(),
                },
                ErrorKind::RenderFailure,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
            assert!(!error.to_string().is_empty());
        }
    }
}
