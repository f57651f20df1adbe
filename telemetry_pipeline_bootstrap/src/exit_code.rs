// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! The CLI surface's exit code contract: `0` on clean shutdown, `1` on
//! initialization failure, `2` on a fatal runtime error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use telemetry_pipeline_bootstrap::exit_code::ExitCode;
//!
//! fn run_application() -> Result<(), Box<dyn std::error::Error>> {
//!     // Application logic here
//!     Ok(())
//! }
//!
//! fn main() {
//!     let result = run_application();
//!     let exit_code = match result {
//!         Ok(_) => ExitCode::Success,
//!         Err(_) => ExitCode::RuntimeError,
//!     };
//!     std::process::exit(exit_code.as_i32());
//! }
//! ```

use std::fmt;

/// Exit codes for the CLI entry point (spec §6 "CLI surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean shutdown.
    #[default]
    Success = 0,

    /// Initialization failed (bad config, unreachable cluster at startup,
    /// malformed index template, CLI argument validation).
    InitError = 1,

    /// Fatal runtime error after successful initialization.
    RuntimeError = 2,
}

impl ExitCode {
    /// Convert to i32 for use with std::process::exit
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get human-readable description of exit code
    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "clean shutdown",
            ExitCode::InitError => "initialization failure",
            ExitCode::RuntimeError => "fatal runtime error",
        }
    }

    /// Check if this is a success exit code
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Check if this is an error exit code
    pub fn is_error(self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

/// Maps any runtime error to [`ExitCode::RuntimeError`] (2). Initialization
/// failures are reported via [`ExitCode::InitError`] (1) by the bootstrap
/// caller before `run_application` is ever entered, so any error observed
/// here is, by construction, a post-initialization fault.
pub fn map_error_to_exit_code(_error: &dyn std::error::Error) -> ExitCode {
    ExitCode::RuntimeError
}

/// Convert a `Result` into a `std::process::ExitCode` suitable for returning
/// from `fn main`.
pub fn result_to_exit_code<T, E: std::error::Error>(result: Result<T, E>) -> std::process::ExitCode {
    let code = match result {
        Ok(_) => ExitCode::Success,
        Err(ref e) => map_error_to_exit_code(e),
    };
    std::process::ExitCode::from(code.as_i32() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::InitError.as_i32(), 1);
        assert_eq!(ExitCode::RuntimeError.as_i32(), 2);
    }

    #[test]
    fn test_is_success() {
        assert!(ExitCode::Success.is_success());
        assert!(!ExitCode::InitError.is_success());
        assert!(!ExitCode::RuntimeError.is_success());
    }

    #[test]
    fn test_is_error() {
        assert!(!ExitCode::Success.is_error());
        assert!(ExitCode::InitError.is_error());
        assert!(ExitCode::RuntimeError.is_error());
    }

    #[test]
    fn test_default() {
        assert_eq!(ExitCode::default(), ExitCode::Success);
    }

    #[test]
    fn test_display() {
        let code = ExitCode::InitError;
        let display = format!("{}", code);
        assert!(display.contains("initialization failure"));
        assert!(display.contains("1"));
    }

    #[test]
    fn test_from_error() {
        use std::io;

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "permission denied");
        assert_eq!(map_error_to_exit_code(&err), ExitCode::RuntimeError);
    }

    #[test]
    fn test_conversion_to_i32() {
        let code: i32 = ExitCode::RuntimeError.into();
        assert_eq!(code, 2);
    }

    #[test]
    fn test_result_to_exit_code() {
        use std::io;
        // `std::process::ExitCode` has no `PartialEq`, so this exercises the
        // enum-level mapping `result_to_exit_code` is built on instead.
        let ok: Result<(), io::Error> = Ok(());
        assert_eq!(ok.map_or(ExitCode::RuntimeError, |_| ExitCode::Success), ExitCode::Success);

        let err: Result<(), io::Error> = Err(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(map_error_to_exit_code(err.as_ref().unwrap_err()), ExitCode::RuntimeError);
        let _ = result_to_exit_code(err);
    }
}
