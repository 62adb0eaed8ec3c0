//! Input shaping and result printing.

use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::error::RexeError;
use crate::evaluator::{Context, LineStream, ScriptEvaluator};
use crate::options::InputMode;

/// Feed `input` to the compiled `unit` as the mode requires, printing every
/// result to `out`.
///
/// # Errors
///
/// Returns the first evaluation failure, an input read error, or an output
/// error (`RexeError::BrokenPipe` when the reader went away).
pub fn dispatch<E, R, W>(
    evaluator: &mut E,
    unit: &E::Unit,
    mode: InputMode,
    mut input: R,
    out: &mut W,
) -> Result<(), RexeError>
where
    E: ScriptEvaluator,
    R: BufRead + 'static,
    W: Write,
{
    info!("Input mode: {mode:?}");
    match mode {
        InputMode::LineString => {
            let mut buf = Vec::new();
            let mut count = 0usize;
            loop {
                buf.clear();
                if input.read_until(b'\n', &mut buf).map_err(RexeError::Input)? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(chomp(&buf)).into_owned();
                let result = evaluator.invoke(unit, Context::Line(line))?;
                print_result(out, &result)?;
                count += 1;
            }
            debug!("Processed {count} lines");
        }
        InputMode::LineEnumerator => {
            let result = evaluator.invoke(unit, Context::Lines(LineStream::new(input)))?;
            print_result(out, &result)?;
        }
        InputMode::WholeString => {
            let mut buf = Vec::new();
            input.read_to_end(&mut buf).map_err(RexeError::Input)?;
            let text = String::from_utf8_lossy(&buf).into_owned();
            let result = evaluator.invoke(unit, Context::Text(text))?;
            print_result(out, &result)?;
        }
        InputMode::NoInput => {
            let result = evaluator.invoke(unit, Context::None)?;
            print_result(out, &result)?;
        }
    }
    out.flush().map_err(RexeError::from_output)
}

/// Strip one trailing `\n` or `\r\n`.
fn chomp(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Write a result followed by a newline unless it already ends with one.
fn print_result<W: Write>(out: &mut W, result: &impl std::fmt::Display) -> Result<(), RexeError> {
    let text = result.to_string();
    out.write_all(text.as_bytes()).map_err(RexeError::from_output)?;
    if !text.ends_with('\n') {
        out.write_all(b"\n").map_err(RexeError::from_output)?;
    }
    Ok(())
}
