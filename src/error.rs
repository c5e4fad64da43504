//! Structured error handling and exit codes.

use std::path::PathBuf;

use serde::Serialize;

/// Failures that map to a specific exit code.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// A cache could not be opened.
    #[error("Cache in {0} is unusable (run with -v for details)")]
    CacheInvalid(PathBuf),

    /// The user pressed Ctrl+C.
    #[error("Interrupted by user")]
    Interrupted,
}

impl AppError {
    /// Exit code reported for this failure.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::CacheInvalid(_) => ExitCode::CacheInvalid,
            Self::Interrupted => ExitCode::Interrupted,
        }
    }
}

/// Exit codes of the thumbcache binary.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: A cache could not be opened (bad directory or format version)
/// - 3: Partial success (some requests produced no result)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Every request was served.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The cache is invalid.
    CacheInvalid = 2,
    /// Some requests were dropped or timed out.
    PartialSuccess = 3,
    /// Interrupted by Ctrl+C.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "TC000",
            Self::GeneralError => "TC001",
            Self::CacheInvalid => "TC002",
            Self::PartialSuccess => "TC003",
            Self::Interrupted => "TC130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "TC001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{:#}", err),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
