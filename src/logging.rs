//! Verbose diagnostics on standard error.
//!
//! Without `-v` no subscriber is installed, so the `tracing` macros used
//! throughout the crate cost next to nothing.

use std::io::{self, IsTerminal};

use tracing::Level;

/// Install the stderr subscriber when `verbose` is set.
///
/// Returns whether a subscriber was installed by this call.
pub fn init(verbose: bool) -> bool {
    if !verbose {
        return false;
    }
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_max_level(Level::DEBUG)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_installs_nothing() {
        assert!(!init(false));
    }
}
