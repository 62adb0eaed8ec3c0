//! Everything that runs before the user's code.
//!
//! Libraries named with `-r` are required first, then `~/.rexerc` (when it
//! exists), then each `-l` file in command line order. Nothing is rolled back
//! when a later step fails.

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::error::RexeError;
use crate::evaluator::ScriptEvaluator;
use crate::options::Options;

/// Require libraries, run the startup file and the `-l` files, in that order.
///
/// # Errors
///
/// Returns the first failure: an unknown library, a missing or unreadable
/// `-l` file, or an error raised while running any of them.
pub fn load_startup<E: ScriptEvaluator>(
    evaluator: &mut E,
    options: &Options,
    startup_file: Option<&Path>,
) -> Result<(), RexeError> {
    for name in &options.requires {
        info!("Requiring {name}");
        evaluator.require(name)?;
    }

    if let Some(path) = startup_file
        && path.is_file()
    {
        load_file(evaluator, path)?;
    }

    for path in &options.load_paths {
        load_file(evaluator, path)?;
    }

    Ok(())
}

fn load_file<E: ScriptEvaluator>(evaluator: &mut E, path: &Path) -> Result<(), RexeError> {
    info!("Loading {}", path.display());
    let source = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            RexeError::MissingLoadFile(path.to_path_buf())
        } else {
            RexeError::ReadFile {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    evaluator.run_source(&source, &path.display().to_string())?;
    Ok(())
}
