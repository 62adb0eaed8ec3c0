//! Startup file and library search path discovery.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Name of the per-user startup file in the home directory.
pub const STARTUP_FILE_NAME: &str = ".rexerc";

/// Environment variable listing directories searched by `require`.
pub const LIBRARY_PATH_ENV_VAR: &str = "REXE_PATH";

/// Get the user's home directory in a cross-platform way.
pub fn get_home_dir() -> Option<PathBuf> {
    home_dir_from(|name| env::var_os(name))
}

/// Resolve the home directory with `lookup` standing in for the environment.
pub fn home_dir_from(lookup: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

    // Try HOME first (Unix-like systems)
    if let Some(home) = non_empty("HOME") {
        return Some(PathBuf::from(home));
    }

    // Try USERPROFILE (Windows)
    if let Some(userprofile) = non_empty("USERPROFILE") {
        return Some(PathBuf::from(userprofile));
    }

    // Try HOMEDRIVE + HOMEPATH (older Windows)
    if let (Some(homedrive), Some(homepath)) = (non_empty("HOMEDRIVE"), non_empty("HOMEPATH")) {
        let mut path = PathBuf::from(homedrive);
        path.push(homepath);
        return Some(path);
    }

    None
}

/// `~/.rexerc` for the given home directory
pub fn startup_file_path(home: &Path) -> PathBuf {
    home.join(STARTUP_FILE_NAME)
}

/// Directories from a `REXE_PATH`-style value, empty entries skipped
pub fn library_search_path(value: Option<OsString>) -> Vec<PathBuf> {
    value
        .map(|paths| {
            env::split_paths(&paths)
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default()
}
