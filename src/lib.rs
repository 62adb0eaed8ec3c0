//! # rexe
//!
//! Filter standard input through one-liners written in a small, Ruby-flavoured
//! expression language. The input can be handed to the code one line at a time,
//! as a lazy stream of lines, as one big string, or not at all.

pub mod ast;
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod interpreter;
pub mod loader;
pub mod logging;
pub mod options;
pub mod parser;

/// Print an error message and exit with the given status code.
pub fn fatal_error(message: &str, code: i32) -> ! {
    eprintln!("rexe: {message}");
    std::process::exit(code);
}
