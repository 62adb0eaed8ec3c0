//! The seam between rexe's driver and the engine that runs user code.
//!
//! Option handling, startup loading and input dispatch only ever talk to a
//! [`ScriptEvaluator`]; the embedded [`crate::interpreter::Interpreter`] is one
//! implementation and tests use a recording fake.

use std::fmt;
use std::io::{self, BufRead};

use crate::error::EvalError;

/// The value handed to the user's code as `self`.
pub enum Context {
    /// One input line, terminator stripped
    Line(String),
    /// A lazy stream over all input lines, terminators retained
    Lines(LineStream),
    /// All of standard input as one string
    Text(String),
    /// No receiver at all
    None,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(line) => f.debug_tuple("Line").field(line).finish(),
            Self::Lines(_) => f.write_str("Lines(..)"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::None => f.write_str("None"),
        }
    }
}

/// Lines read lazily from a reader, each keeping its terminator.
///
/// The stream can only be walked once; a drained stream yields nothing.
pub struct LineStream {
    reader: Box<dyn BufRead>,
}

impl LineStream {
    pub fn new(reader: impl BufRead + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }
}

impl Iterator for LineStream {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => Some(Ok(String::from_utf8_lossy(&buf).into_owned())),
            Err(e) => Some(Err(e)),
        }
    }
}

/// An engine able to run rexe source code.
pub trait ScriptEvaluator {
    /// A compiled, repeatedly invocable piece of user code
    type Unit;
    /// The result of one invocation; its `Display` form is what gets printed
    type Output: fmt::Display;

    /// Make a named library available to later code.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the library cannot be found or fails while loading.
    fn require(&mut self, name: &str) -> Result<(), EvalError>;

    /// Run a whole source file in the shared top-level context, keeping the
    /// functions and constants it defines.
    ///
    /// # Errors
    ///
    /// Returns `Err` on a syntax error or when the code fails while running.
    fn run_source(&mut self, source: &str, origin: &str) -> Result<(), EvalError>;

    /// Compile the user's code into a unit.
    ///
    /// # Errors
    ///
    /// Returns `Err` on a syntax error.
    fn compile(&mut self, source: &str) -> Result<Self::Unit, EvalError>;

    /// Run a compiled unit with `context` bound as `self`.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the user's code fails.
    fn invoke(&mut self, unit: &Self::Unit, context: Context) -> Result<Self::Output, EvalError>;
}
