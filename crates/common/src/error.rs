//! Error classification shared by every service.

/// Coarse error taxonomy used to map service failures onto transport responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced customer, loan or schedule does not exist.
    NotFound,
    /// The request payload is malformed.
    InvalidInput,
    /// Storage, cache or bus failure.
    Internal,
    /// The entity being created already exists.
    AlreadyExists,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Internal => "INTERNAL_ERROR",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
