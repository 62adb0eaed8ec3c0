//! CLI module containing the main entry point logic.

use crate::error::{FAILURE_EXIT_CODE, RexeError};
use crate::evaluator::ScriptEvaluator;
use crate::interpreter::{EVAL_STACK_SIZE, Interpreter};
use crate::options::{self, OPTIONS_ENV_VAR, Options};
use crate::{config, executor, fatal_error, loader, logging};
use std::env;
use std::io;
use std::thread;
use std::time::Instant;
use tracing::info;

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main CLI logic.
pub fn run_cli() {
    let started = Instant::now();

    let args: Vec<String> = env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let env_options = env::var(OPTIONS_ENV_VAR).ok();
    let args = options::merge_env_options(args, env_options.as_deref())
        .unwrap_or_else(|e| fatal_error(&e.to_string(), e.exit_code()));
    let options = options::parse_options(args).unwrap_or_else(|e| e.exit());

    logging::init(options.verbose);
    info!("rexe version {PKG_VERSION} started");
    info!("Source code: {}", options.source);

    let outcome = run_on_eval_thread(options.clone());
    info!("rexe time elapsed: {} seconds", started.elapsed().as_secs_f64());

    if let Err(e) = outcome {
        if e.is_reported() {
            eprintln!("rexe: {e}");
        }
        std::process::exit(e.exit_code());
    }
}

/// Run on a thread whose stack fits the interpreter's call depth limit.
fn run_on_eval_thread(options: Options) -> Result<(), RexeError> {
    let handle = thread::Builder::new()
        .name("rexe-eval".to_string())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || run(&options))
        .unwrap_or_else(|e| fatal_error(&format!("cannot start evaluator: {e}"), FAILURE_EXIT_CODE));
    handle
        .join()
        .unwrap_or_else(|_| fatal_error("evaluator panicked", FAILURE_EXIT_CODE))
}

fn run(options: &Options) -> Result<(), RexeError> {
    let search_path = config::library_search_path(env::var_os(config::LIBRARY_PATH_ENV_VAR));
    let mut interpreter = Interpreter::new().with_search_path(search_path);

    let startup_file = config::get_home_dir().map(|home| config::startup_file_path(&home));
    loader::load_startup(&mut interpreter, options, startup_file.as_deref())?;

    let unit = interpreter.compile(&options.source)?;

    let stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    executor::dispatch(&mut interpreter, &unit, options.input_mode, stdin, &mut stdout)
}
