//! Error types and exit codes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::parser::ParseError;

/// Exit status used when standard output is closed by the reader.
pub const BROKEN_PIPE_EXIT_CODE: i32 = 243;

/// Exit status for failures while loading or running code.
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Exit status for bad options (matches clap's usage errors).
pub const USAGE_EXIT_CODE: i32 = 2;

/// Failures raised by the script evaluator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{0}")]
    Syntax(#[from] ParseError),

    #[error("undefined local variable or method '{0}'")]
    UndefinedName(String),

    #[error("uninitialized constant {0}")]
    UndefinedConstant(String),

    #[error("undefined method '{method}' for {receiver}")]
    UndefinedMethod {
        method: String,
        receiver: &'static str,
    },

    #[error("wrong number of arguments for '{name}' (given {given}, expected {expected})")]
    Arity {
        name: String,
        given: usize,
        expected: String,
    },

    #[error("{0}")]
    Type(String),

    #[error("divided by 0")]
    ZeroDivision,

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot load such file -- {0}")]
    LoadError(String),

    #[error("error reading {path}: {source}")]
    ReadFile { path: String, source: io::Error },

    #[error("error reading input: {0}")]
    Input(#[from] io::Error),

    #[error("stack level too deep")]
    StackOverflow,
}

impl EvalError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }
}

/// Everything that can end a rexe run early.
#[derive(Debug, Error)]
pub enum RexeError {
    #[error("{0}")]
    Eval(#[from] EvalError),

    #[error("cannot load such file -- {}", .0.display())]
    MissingLoadFile(PathBuf),

    #[error("error reading {}: {source}", path.display())]
    ReadFile { path: PathBuf, source: io::Error },

    #[error("error reading standard input: {0}")]
    Input(io::Error),

    #[error("error writing output: {0}")]
    Output(io::Error),

    #[error("invalid REXE_OPTIONS: {0}")]
    InvalidOptions(String),

    /// Standard output was closed by the reader.
    #[error("broken pipe")]
    BrokenPipe,
}

impl RexeError {
    /// Classify a failed write to standard output.
    #[must_use]
    pub fn from_output(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::BrokenPipe {
            Self::BrokenPipe
        } else {
            Self::Output(error)
        }
    }

    /// The process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BrokenPipe => BROKEN_PIPE_EXIT_CODE,
            Self::InvalidOptions(_) => USAGE_EXIT_CODE,
            _ => FAILURE_EXIT_CODE,
        }
    }

    /// Whether the error should be reported on stderr before exiting.
    #[must_use]
    pub fn is_reported(&self) -> bool {
        !matches!(self, Self::BrokenPipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_pipe_is_silent_with_its_own_code() {
        let err = RexeError::from_output(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, RexeError::BrokenPipe));
        assert_eq!(err.exit_code(), BROKEN_PIPE_EXIT_CODE);
        assert!(!err.is_reported());
    }

    #[test]
    fn test_other_output_errors_are_failures() {
        let err = RexeError::from_output(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, RexeError::Output(_)));
        assert_eq!(err.exit_code(), FAILURE_EXIT_CODE);
        assert!(err.is_reported());
    }

    #[test]
    fn test_eval_error_messages() {
        assert_eq!(
            EvalError::UndefinedConstant("JSON".to_string()).to_string(),
            "uninitialized constant JSON"
        );
        assert_eq!(
            RexeError::MissingLoadFile(PathBuf::from("nope.rexe")).to_string(),
            "cannot load such file -- nope.rexe"
        );
        assert_eq!(RexeError::InvalidOptions("x".to_string()).exit_code(), USAGE_EXIT_CODE);
    }
}
