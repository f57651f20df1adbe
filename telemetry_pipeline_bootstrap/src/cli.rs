// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! The runtime's CLI surface is intentionally small: a single positional
//! config-file argument, per the collaborator contract the runtime exposes to
//! its outer shell. Parsing the config file itself (YAML, plugin wiring) is a
//! collaborator concern outside this crate; this module only parses and
//! validates the process arguments.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. clap::Parser::parse()            │  Parse argv
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. SecureArgParser::validate_path   │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                     │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum single argument length
const MAX_ARG_LENGTH: usize = 1000;

/// Maximum path length
const MAX_PATH_LENGTH: usize = 4096;

/// Dangerous patterns that indicate potential attacks
const DANGEROUS_PATTERNS: &[&str] = &["`", ";", "&", "|", "\n", "\r", "\0"];

/// Protected system directories
const PROTECTED_DIRS: &[&str] = &[
    "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
];

/// Secure argument parsing errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// Argument exceeds maximum length
    #[error("Argument too long (max {MAX_ARG_LENGTH} characters): {0}")]
    ArgumentTooLong(String),

    /// Dangerous pattern detected
    #[error("Dangerous pattern detected in argument: {pattern} in {arg}")]
    DangerousPattern { pattern: String, arg: String },

    /// Path exceeds maximum length
    #[error("Path exceeds maximum length (max {MAX_PATH_LENGTH})")]
    PathTooLong,

    /// Attempted access to protected system directory
    #[error("Access to protected system directory denied: {0}")]
    ProtectedDirectory(String),

    /// Path does not exist
    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Security-first argument validation.
///
/// Applies the same pattern-rejection and canonicalization rules the
/// enterprise layers rely on for any path handed in from the outside.
pub struct SecureArgParser;

impl SecureArgParser {
    /// Validate a single argument for security issues
    pub fn validate_argument(arg: &str) -> Result<(), ParseError> {
        if arg.len() > MAX_ARG_LENGTH {
            return Err(ParseError::ArgumentTooLong(
                arg.chars().take(50).collect::<String>() + "...",
            ));
        }

        for pattern in DANGEROUS_PATTERNS {
            if arg.contains(pattern) {
                return Err(ParseError::DangerousPattern {
                    pattern: pattern.to_string(),
                    arg: arg.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Validate and canonicalize a file path that must already exist.
    pub fn validate_path(path: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(path).map_err(|e| match e {
            ParseError::ArgumentTooLong(_) => ParseError::InvalidPath(format!("path too long: {path}")),
            ParseError::DangerousPattern { pattern, .. } => {
                ParseError::InvalidPath(format!("path contains dangerous pattern '{pattern}': {path}"))
            }
            other => other,
        })?;

        let path_obj = Path::new(path);
        let canonical = path_obj.canonicalize().map_err(|e| {
            if !path_obj.exists() {
                ParseError::PathNotFound(path.to_string())
            } else {
                ParseError::InvalidPath(format!("{path}: {e}"))
            }
        })?;

        if canonical.to_string_lossy().len() > MAX_PATH_LENGTH {
            return Err(ParseError::PathTooLong);
        }

        for protected in PROTECTED_DIRS {
            if canonical.starts_with(protected) {
                return Err(ParseError::ProtectedDirectory(canonical.display().to_string()));
            }
        }

        Ok(canonical)
    }
}

/// `data-prepper <config-file>` — the runtime's entire CLI surface.
#[derive(Debug, Parser)]
#[command(name = "data-prepper", about = "Telemetry pipeline runtime")]
pub struct Cli {
    /// Path to the pipeline configuration file (YAML parsing is a
    /// collaborator concern outside this crate).
    pub config_file: PathBuf,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parsed and security-validated CLI arguments.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub config_file: PathBuf,
    pub verbose: bool,
}

/// Parse `argv` and apply security validation to the config-file path.
///
/// # Errors
///
/// Returns [`ParseError`] if the config-file path fails validation. Clap
/// handles `--help`/`--version` and malformed argv itself (exiting the
/// process before this function returns).
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = Cli::parse();
    validate_cli(cli)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config_file = SecureArgParser::validate_path(&cli.config_file.to_string_lossy())?;
    Ok(ValidatedCli {
        config_file,
        verbose: cli.verbose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_argument_rejects_command_chaining() {
        let err = SecureArgParser::validate_argument("config.yaml; rm -rf /").unwrap_err();
        assert!(matches!(err, ParseError::DangerousPattern { .. }));
    }

    #[test]
    fn validate_argument_accepts_plain_path() {
        assert!(SecureArgParser::validate_argument("/tmp/data-prepper/config.yaml").is_ok());
    }

    #[test]
    fn validate_path_rejects_missing_file() {
        let err = SecureArgParser::validate_path("/tmp/does-not-exist-data-prepper.yaml").unwrap_err();
        assert!(matches!(err, ParseError::PathNotFound(_)));
    }

    #[test]
    fn validate_path_rejects_protected_directory() {
        let err = SecureArgParser::validate_path("/etc/hostname").unwrap_err();
        assert!(matches!(err, ParseError::ProtectedDirectory(_)));
    }
}
