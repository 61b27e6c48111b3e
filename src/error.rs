use std::{error::Error, fmt};

/// The one error type the query core propagates. Every fallible operation
/// from page I/O up through the parser returns `Result<_, SmallError>`;
/// the `kind` tag lets callers distinguish fatal storage failures from
/// refusals that should simply print a diagnostic and let the caller
/// continue (parse errors, empty plans, conflicts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Semantic,
    Plan,
    Storage,
    Conflict,
    Internal,
}

#[derive(Debug, Clone)]
pub struct SmallError {
    kind: ErrorKind,
    message: String,
}

impl SmallError {
    pub fn new(msg: &str) -> SmallError {
        SmallError {
            kind: ErrorKind::Internal,
            message: msg.to_string(),
        }
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> SmallError {
        SmallError {
            kind,
            message: msg.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> SmallError {
        Self::with_kind(ErrorKind::Parse, msg)
    }

    pub fn semantic(msg: impl Into<String>) -> SmallError {
        Self::with_kind(ErrorKind::Semantic, msg)
    }

    pub fn plan(msg: impl Into<String>) -> SmallError {
        Self::with_kind(ErrorKind::Plan, msg)
    }

    pub fn storage(msg: impl Into<String>) -> SmallError {
        Self::with_kind(ErrorKind::Storage, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> SmallError {
        Self::with_kind(ErrorKind::Conflict, msg)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SmallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for SmallError {}

impl From<std::io::Error> for SmallError {
    fn from(e: std::io::Error) -> Self {
        SmallError::storage(e.to_string())
    }
}
