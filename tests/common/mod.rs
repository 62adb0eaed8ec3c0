//! Common test helpers shared across integration tests

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)] // Not all helpers are used by every test file

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Package version for testing --version flag
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Helper to get the compiled binary path
pub fn get_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rexe"))
}

/// Helper to create a temporary directory for tests
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().unwrap()
}

/// Helper to write a `.rexerc` into a fake home directory
pub fn create_rexerc(home: &Path, content: &str) {
    fs::write(home.join(".rexerc"), content).unwrap();
}

/// Helper to create a Command with test environment
/// Points HOME at `home`, drops any REXE_* variables from the caller and
/// closes stdin so a run that wrongly reads it finishes instead of hanging
pub fn test_command(home: &Path) -> Command {
    let mut cmd = Command::new(get_binary_path());
    cmd.env("HOME", home)
        .env_remove("USERPROFILE")
        .env_remove("REXE_OPTIONS")
        .env_remove("REXE_PATH")
        .stdin(Stdio::null());
    cmd
}

/// Run `cmd` with `input` on stdin and collect its output
pub fn run_with_input(cmd: &mut Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute command");

    let mut stdin = child.stdin.take().unwrap();
    let input = input.to_string();
    // The child may exit without reading everything
    let writer = std::thread::spawn(move || {
        let _ = stdin.write_all(input.as_bytes());
    });

    let output = child.wait_with_output().expect("Failed to wait for command");
    writer.join().unwrap();
    output
}

pub fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
