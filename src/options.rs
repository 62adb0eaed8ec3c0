//! Command line and `REXE_OPTIONS` handling.

use clap::Parser as ClapParser;
use std::path::PathBuf;

use crate::error::RexeError;

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable whose words are read before the command line.
pub const OPTIONS_ENV_VAR: &str = "REXE_OPTIONS";

const MODES_HELP: &str = "\
Input modes:
  s  run the code once per input line, the line without its newline is self (default)
  e  run the code once, self is a lazy stream of input lines
  b  run the code once, self is all of standard input as one string
  n  run the code once with no self, standard input is not read

Options from REXE_OPTIONS are applied first; ~/.rexerc is run if it exists.";

/// How standard input is handed to the user's code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum InputMode {
    /// Once per line, terminator stripped
    #[default]
    #[value(name = "s")]
    LineString,
    /// Once, over a lazy stream of lines
    #[value(name = "e")]
    LineEnumerator,
    /// Once, over all of stdin as one string
    #[value(name = "b")]
    WholeString,
    /// Once, without reading stdin
    #[value(name = "n")]
    NoInput,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Options {
    pub input_mode: InputMode,
    pub requires: Vec<String>,
    pub load_paths: Vec<PathBuf>,
    pub verbose: bool,
    pub source: String,
}

#[derive(ClapParser, Debug)]
#[command(name = "rexe")]
#[command(version = PKG_VERSION)]
#[command(about = "Run Ruby-flavoured one-liners over standard input", long_about = None)]
#[command(after_help = MODES_HELP)]
#[command(args_override_self = true)]
struct Cli {
    /// Run a source file before the user code (repeatable)
    #[arg(short, long = "load", value_name = "PATH")]
    load: Vec<PathBuf>,

    /// Input mode: s, e, b or n
    #[arg(short, long, value_enum, value_name = "MODE", default_value = "s")]
    mode: InputMode,

    /// Libraries to require, comma separated (repeatable)
    #[arg(short, long = "require", value_name = "NAMES")]
    require: Vec<String>,

    /// Log progress to standard error
    #[arg(short, long, overrides_with = "no_verbose")]
    verbose: bool,

    /// Turn verbose logging back off
    #[arg(long, overrides_with = "verbose")]
    no_verbose: bool,

    /// Code to run; all remaining words are joined with spaces
    #[arg(value_name = "SOURCE", trailing_var_arg = true)]
    source: Vec<String>,
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        let requires = cli
            .require
            .iter()
            .flat_map(|names| names.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            input_mode: cli.mode,
            requires,
            load_paths: cli.load,
            verbose: cli.verbose && !cli.no_verbose,
            source: cli.source.join(" "),
        }
    }
}

/// Splice the words of `env` in after the program name.
///
/// Options in the environment variable come before the explicit ones, so the
/// command line wins for single-valued options.
///
/// # Errors
///
/// Returns `RexeError::InvalidOptions` if `env` has unbalanced quotes.
pub fn merge_env_options(args: Vec<String>, env: Option<&str>) -> Result<Vec<String>, RexeError> {
    let Some(env) = env.filter(|value| !value.trim().is_empty()) else {
        return Ok(args);
    };
    let words = shlex::split(env)
        .ok_or_else(|| RexeError::InvalidOptions(format!("unbalanced quotes in {env:?}")))?;

    let mut args = args.into_iter();
    let mut merged: Vec<String> = args.next().into_iter().collect();
    merged.extend(words);
    merged.extend(args);
    Ok(merged)
}

/// Parse a full argument list (program name first).
///
/// # Errors
///
/// Returns the clap error for unknown flags, bad mode values, `--help` and
/// `--version`; callers usually `exit()` with it.
pub fn parse_options<I, T>(args: I) -> Result<Options, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args).map(Options::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        std::iter::once("rexe")
            .chain(words.iter().copied())
            .map(str::to_string)
            .collect()
    }

    fn parse(words: &[&str]) -> Options {
        parse_options(args(words)).unwrap()
    }

    #[test]
    fn test_defaults() {
        let options = parse(&["upcase"]);
        assert_eq!(options.input_mode, InputMode::LineString);
        assert!(options.requires.is_empty());
        assert!(options.load_paths.is_empty());
        assert!(!options.verbose);
        assert_eq!(options.source, "upcase");
    }

    #[test]
    fn test_modes() {
        assert_eq!(parse(&["-me", "x"]).input_mode, InputMode::LineEnumerator);
        assert_eq!(parse(&["-m", "b", "x"]).input_mode, InputMode::WholeString);
        assert_eq!(parse(&["--mode=n", "x"]).input_mode, InputMode::NoInput);
        assert_eq!(parse(&["-mb", "-mn", "x"]).input_mode, InputMode::NoInput);
    }

    #[test]
    fn test_invalid_mode_lists_choices() {
        let err = parse_options(args(&["-m", "x", "self"])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("s, e, b, n"), "{message}");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_requires_are_split_and_trimmed() {
        let options = parse(&["-r", "a, b,", "-r", "c", "x"]);
        assert_eq!(options.requires, vec!["a", "b", "c"]);
        let options = parse(&["-r", "json", "-r", "json", "x"]);
        assert_eq!(options.requires, vec!["json", "json"]);
    }

    #[test]
    fn test_load_paths_keep_order() {
        let options = parse(&["-l", "one.rb", "--load", "two.rb", "x"]);
        assert_eq!(options.load_paths, vec![PathBuf::from("one.rb"), PathBuf::from("two.rb")]);
    }

    #[test]
    fn test_last_verbose_flag_wins() {
        assert!(parse(&["-v", "x"]).verbose);
        assert!(!parse(&["-v", "--no-verbose", "x"]).verbose);
        assert!(parse(&["--no-verbose", "--verbose", "x"]).verbose);
    }

    #[test]
    fn test_source_words_are_joined() {
        let options = parse(&["-mn", "[1,", "2].size", "-v"]);
        assert_eq!(options.source, "[1, 2].size -v");
        assert!(!options.verbose);
    }

    #[test]
    fn test_attached_mode_is_not_source() {
        let options = parse(&["-mn", "JSON.name"]);
        assert_eq!(options.input_mode, InputMode::NoInput);
        assert_eq!(options.source, "JSON.name");

        let options = parse(&["-vme", "to_a.size"]);
        assert_eq!(options.input_mode, InputMode::LineEnumerator);
        assert!(options.verbose);
        assert_eq!(options.source, "to_a.size");
    }

    #[test]
    fn test_double_dash_allows_leading_hyphen_source() {
        let options = parse(&["-mn", "--", "-5.abs"]);
        assert_eq!(options.source, "-5.abs");
    }

    #[test]
    fn test_unknown_flag_is_a_usage_error() {
        let err = parse_options(args(&["--bogus", "x"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = parse_options(args(&["-mn", "-z", "x"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_env_options_go_first() {
        let merged = merge_env_options(args(&["-mn", "x"]), Some("-r json -v")).unwrap();
        assert_eq!(merged, args(&["-r", "json", "-v", "-mn", "x"]));
    }

    #[test]
    fn test_env_options_quoting() {
        let merged = merge_env_options(args(&["x"]), Some(r#"-r "a, b""#)).unwrap();
        assert_eq!(merged, args(&["-r", "a, b", "x"]));
        assert!(matches!(
            merge_env_options(args(&["x"]), Some("-r 'json")),
            Err(RexeError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_blank_env_is_ignored() {
        assert_eq!(merge_env_options(args(&["x"]), Some("   ")).unwrap(), args(&["x"]));
        assert_eq!(merge_env_options(args(&["x"]), None).unwrap(), args(&["x"]));
    }

    #[test]
    fn test_command_line_overrides_env_mode() {
        let merged = merge_env_options(args(&["-mn", "x"]), Some("-mb")).unwrap();
        assert_eq!(parse_options(merged).unwrap().input_mode, InputMode::NoInput);
    }
}
