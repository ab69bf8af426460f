use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocbaseErrorCode {
    InvalidArgument,
    NotFound,
    Aborted,
    Internal,
    PermissionDenied,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
}

impl DocbaseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocbaseErrorCode::InvalidArgument => "docbase/invalid-argument",
            DocbaseErrorCode::NotFound => "docbase/not-found",
            DocbaseErrorCode::Aborted => "docbase/aborted",
            DocbaseErrorCode::Internal => "docbase/internal",
            DocbaseErrorCode::PermissionDenied => "docbase/permission-denied",
            DocbaseErrorCode::Unavailable => "docbase/unavailable",
            DocbaseErrorCode::DeadlineExceeded => "docbase/deadline-exceeded",
            DocbaseErrorCode::ResourceExhausted => "docbase/resource-exhausted",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DocbaseError {
    pub code: DocbaseErrorCode,
    message: String,
}

impl DocbaseError {
    pub fn new(code: DocbaseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for DocbaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for DocbaseError {}

pub type DocbaseResult<T> = Result<T, DocbaseError>;

pub fn invalid_argument(message: impl Into<String>) -> DocbaseError {
    DocbaseError::new(DocbaseErrorCode::InvalidArgument, message)
}

pub fn not_found(message: impl Into<String>) -> DocbaseError {
    DocbaseError::new(DocbaseErrorCode::NotFound, message)
}

pub fn aborted(message: impl Into<String>) -> DocbaseError {
    DocbaseError::new(DocbaseErrorCode::Aborted, message)
}

pub fn internal_error(message: impl Into<String>) -> DocbaseError {
    DocbaseError::new(DocbaseErrorCode::Internal, message)
}

pub fn permission_denied(message: impl Into<String>) -> DocbaseError {
    DocbaseError::new(DocbaseErrorCode::PermissionDenied, message)
}

pub fn unavailable(message: impl Into<String>) -> DocbaseError {
    DocbaseError::new(DocbaseErrorCode::Unavailable, message)
}

pub fn deadline_exceeded(message: impl Into<String>) -> DocbaseError {
    DocbaseError::new(DocbaseErrorCode::DeadlineExceeded, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> DocbaseError {
    DocbaseError::new(DocbaseErrorCode::ResourceExhausted, message)
}
