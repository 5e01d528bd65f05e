//! Snapshot error types
//!
//! Error codes:
//! - AERO_HA_SNAPSHOT_UNAVAILABLE (ERROR severity)
//! - AERO_HA_SNAPSHOT_IO (ERROR severity)
//! - AERO_HA_SNAPSHOT_MANIFEST (ERROR severity)
//! - AERO_HA_SNAPSHOT_CORRUPT (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for snapshot errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, node may retry
    Error,
    /// Stored state cannot be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Snapshot-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotErrorCode {
    /// No snapshot could be obtained (leader unreachable, store empty)
    AeroHaSnapshotUnavailable,
    /// I/O failure while reading or writing a snapshot
    AeroHaSnapshotIo,
    /// Manifest could not be written or parsed
    AeroHaSnapshotManifest,
    /// Stored state does not match its manifest checksum
    AeroHaSnapshotCorrupt,
}

impl SnapshotErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SnapshotErrorCode::AeroHaSnapshotUnavailable => "AERO_HA_SNAPSHOT_UNAVAILABLE",
            SnapshotErrorCode::AeroHaSnapshotIo => "AERO_HA_SNAPSHOT_IO",
            SnapshotErrorCode::AeroHaSnapshotManifest => "AERO_HA_SNAPSHOT_MANIFEST",
            SnapshotErrorCode::AeroHaSnapshotCorrupt => "AERO_HA_SNAPSHOT_CORRUPT",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SnapshotErrorCode::AeroHaSnapshotCorrupt => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for SnapshotErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Snapshot error with code, message and optional context
#[derive(Debug)]
pub struct SnapshotError {
    code: SnapshotErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl SnapshotError {
    /// Create a snapshot unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::AeroHaSnapshotUnavailable,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a snapshot I/O error with path context
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::AeroHaSnapshotIo,
            message: format!("I/O error at path: {}", path.display()),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new manifest error
    pub fn manifest_error(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::AeroHaSnapshotManifest,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a manifest error with IO source
    pub fn manifest_io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: SnapshotErrorCode::AeroHaSnapshotManifest,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a corruption error
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self {
            code: SnapshotErrorCode::AeroHaSnapshotCorrupt,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Add details to an error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> SnapshotErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the stored snapshot must not be used
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for snapshot operations
pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SnapshotErrorCode::AeroHaSnapshotUnavailable.code(),
            "AERO_HA_SNAPSHOT_UNAVAILABLE"
        );
        assert_eq!(SnapshotErrorCode::AeroHaSnapshotIo.code(), "AERO_HA_SNAPSHOT_IO");
        assert_eq!(
            SnapshotErrorCode::AeroHaSnapshotCorrupt.code(),
            "AERO_HA_SNAPSHOT_CORRUPT"
        );
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(!SnapshotError::unavailable("leader unreachable").is_fatal());
        assert!(!SnapshotError::manifest_error("bad json").is_fatal());
        assert!(SnapshotError::corrupt("checksum mismatch").is_fatal());
    }

    #[test]
    fn test_error_display_contains_required_fields() {
        let err = SnapshotError::unavailable("no leader answered")
            .with_details("timeout after 30s");
        let display = format!("{}", err);
        assert!(display.contains("AERO_HA_SNAPSHOT_UNAVAILABLE"));
        assert!(display.contains("ERROR"));
        assert!(display.contains("no leader answered"));
        assert!(display.contains("timeout after 30s"));
    }

    #[test]
    fn test_io_error_with_path() {
        let path = std::path::Path::new("/snapshots/state.bin");
        let err = SnapshotError::io_error_at_path(
            path,
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.message().contains("/snapshots/state.bin"));
        assert_eq!(err.code(), SnapshotErrorCode::AeroHaSnapshotIo);
        assert!(std::error::Error::source(&err).is_some());
    }
}
