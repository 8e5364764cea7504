use thiserror::Error;

use crate::{ElementId, LoaderStatus, UploadId};

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Result type for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Errors raised across the upload core boundary
#[derive(Error, Debug, Clone)]
pub enum UploadError {
    /// A read or upload failed while the loader was neither `Error` nor `Aborted`.
    #[error("Unexpected failure for upload {upload_id}: {source}")]
    UnexpectedFailure {
        upload_id: UploadId,
        #[source]
        source: LoaderError,
    },

    #[error("Upload {upload_id} completed without a default URL")]
    MissingDefaultUrl { upload_id: UploadId },

    #[error("Element not found: {id}")]
    ElementNotFound { id: ElementId },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Upload task failed: {message}")]
    TaskFailed { message: String },
}

impl UploadError {
    /// Create an unexpected failure error
    pub fn unexpected(upload_id: UploadId, source: LoaderError) -> Self {
        Self::UnexpectedFailure { upload_id, source }
    }

    /// Create an element not found error
    pub fn element_not_found(id: ElementId) -> Self {
        Self::ElementNotFound { id }
    }

    /// Create an invalid operation error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a task failure error
    pub fn task_failed<S: Into<String>>(message: S) -> Self {
        Self::TaskFailed {
            message: message.into(),
        }
    }
}

/// Errors reported by a loader's read or upload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    #[error("Upload aborted")]
    Aborted,

    #[error("{message}")]
    Transport { message: String },

    #[error("Reading file failed: {message}")]
    Read { message: String },

    #[error("Loader is {actual}, expected {expected}")]
    InvalidState {
        expected: LoaderStatus,
        actual: LoaderStatus,
    },
}

impl LoaderError {
    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a read error
    pub fn read<S: Into<String>>(message: S) -> Self {
        Self::Read {
            message: message.into(),
        }
    }
}
