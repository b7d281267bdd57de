//! Error types for birthdaystore

use std::fmt;
use std::io;

use crate::types::Name;

/// Result type alias for birthdaystore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store operations
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Parse error
    Parse(String),

    /// Name is empty or contains a record separator
    InvalidName(String),

    /// Name too long (max 256 bytes)
    NameTooLong(usize),

    /// No birthday stored for the name
    NotFound,

    /// Store is closed
    Closed,

    /// Seeding failed for one name
    Seed {
        /// Name being written
        name: Name,
        /// Underlying failure
        source: Box<Error>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::InvalidName(name) => write!(f, "Invalid name: {:?}", name),
            Error::NameTooLong(len) => write!(f, "Name too long: {} bytes (max 256)", len),
            Error::NotFound => write!(f, "Birthday not found"),
            Error::Closed => write!(f, "Store is closed"),
            Error::Seed { name, source } => {
                write!(f, "Inserting birthday for {:?}: {}", name.as_str(), source)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Seed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}
