/// Error types for the geodat library
use std::fmt;
use std::io;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, GeoIpError>;

/// Main error type for database operations
///
/// Only `open` and `watch` surface errors; query operations deliberately
/// swallow failures and return the unknown sentinel or `None` instead,
/// because callers treat GeoIP as best-effort enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoIpError {
    /// I/O errors
    Io(String),

    /// Structural errors in the database file
    Format(String),

    /// The trailing header carried an edition byte this library does not know
    UnknownEdition(u8),

    /// File-watcher errors
    Watch(String),
}

impl fmt::Display for GeoIpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoIpError::Io(msg) => write!(f, "I/O error: {}", msg),
            GeoIpError::Format(msg) => write!(f, "Format error: {}", msg),
            GeoIpError::UnknownEdition(byte) => {
                write!(f, "Unknown database edition: {}", byte)
            }
            GeoIpError::Watch(msg) => write!(f, "Watch error: {}", msg),
        }
    }
}

impl std::error::Error for GeoIpError {}

impl From<io::Error> for GeoIpError {
    fn from(err: io::Error) -> Self {
        GeoIpError::Io(err.to_string())
    }
}

impl From<notify::Error> for GeoIpError {
    fn from(err: notify::Error) -> Self {
        GeoIpError::Watch(err.to_string())
    }
}
