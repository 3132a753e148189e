//! CLI error types with miette diagnostics

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific error types with enhanced diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Command '{command}' failed")]
    #[diagnostic(code(buildstash::cli::command_failed))]
    CommandFailed {
        command: String,
        #[source]
        #[diagnostic_source]
        source: buildstash_cache::Error,
    },

    #[error("Invalid command line argument: {argument}")]
    #[diagnostic(code(buildstash::cli::invalid_argument))]
    InvalidArgument {
        argument: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("File operation failed: {operation} {}", path.display())]
    #[diagnostic(
        code(buildstash::cli::file_error),
        help("Check file permissions and ensure the path exists")
    )]
    FileError {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output")]
    #[diagnostic(code(buildstash::cli::output_error))]
    OutputError {
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn command_failed(command: impl Into<String>, source: buildstash_cache::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    pub fn invalid_argument(argument: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            suggestion: None,
        }
    }

    pub fn invalid_argument_with_suggestion(
        argument: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn file_error(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileError {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    pub fn output_error(source: std::io::Error) -> Self {
        Self::OutputError { source }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_message() {
        let error = CliError::invalid_argument("--file obj");
        assert!(
            error
                .to_string()
                .contains("Invalid command line argument: --file obj")
        );
    }

    #[test]
    fn test_invalid_argument_suggestion_is_help() {
        let error = CliError::invalid_argument_with_suggestion("--file obj", "use --file <id>=<path>");
        let help = error.help().map(|h| h.to_string());
        assert_eq!(help.as_deref(), Some("use --file <id>=<path>"));
    }

    #[test]
    fn test_command_failed_keeps_source() {
        let error = CliError::command_failed(
            "clear",
            buildstash_cache::Error::configuration("no cache root"),
        );
        assert_eq!(error.to_string(), "Command 'clear' failed");
        let source = std::error::Error::source(&error).map(|s| s.to_string());
        assert!(source.unwrap().contains("no cache root"));
    }

    #[test]
    fn test_file_error_names_path() {
        let error = CliError::file_error(
            "read",
            "/tmp/out.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(error.to_string().contains("/tmp/out.txt"));
    }
}
