//! # rexe
//!
//! Run a one-liner against standard input.
//!
//! ## Usage
//!
//! - Per line: `ls | rexe upcase`
//! - Whole input: `cat file | rexe -mb 'lines.size'`
//! - Line stream: `cat file | rexe -me 'to_a.sort'`
//! - No input: `rexe -mn '6 * 7'`
//!
//! Options in `REXE_OPTIONS` are applied before the command line ones, and
//! `~/.rexerc` is run before any user code if it exists.

/// Entry point for the CLI tool.
fn main() {
    rexe::cli::run_cli();
}
