//! User-friendly parse error types and formatting.
//!
//! Converts raw pest parser errors into structured, human-readable diagnostics
//! with source context, a column indicator, and an occasional hint.

use std::fmt;

use super::Rule;

/// A structured, user-friendly parser error.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Human-readable error message (no raw rule names).
    pub message: String,
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed) where the error begins.
    pub col: usize,
    /// End column for span errors (used to size the underline caret).
    pub col_end: Option<usize>,
    /// The full text of the offending source line.
    pub source_line: Option<String>,
    /// Where the source came from: a file path or `-e` for the command line.
    pub origin: Option<String>,
    /// Optional suggestion to help the user fix the error.
    pub hint: Option<String>,
}

impl ParseError {
    /// Build a `ParseError` from a pest error, enriching it with source context.
    pub fn from_pest(error: &pest::error::Error<Rule>, source: &str, origin: Option<&str>) -> Self {
        let (line, col, col_end) = match error.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c, None),
            pest::error::LineColLocation::Span((sl, sc), (el, ec)) => {
                let end = if sl == el { Some(ec) } else { None };
                (sl, sc, end)
            }
        };

        let source_line = source
            .lines()
            .nth(line.saturating_sub(1))
            .map(str::to_string);

        let (message, hint) = match &error.variant {
            pest::error::ErrorVariant::ParsingError { positives, .. } => {
                (friendly_message(positives), friendly_hint(positives, source_line.as_deref()))
            }
            pest::error::ErrorVariant::CustomError { message } => (message.clone(), None),
        };

        ParseError {
            message,
            line,
            col,
            col_end,
            source_line,
            origin: origin.map(str::to_string),
            hint,
        }
    }
}

/// Return a short, user-facing label for a grammar rule, or `None` to omit it.
fn rule_label(rule: Rule) -> Option<&'static str> {
    match rule {
        Rule::expression => Some("expression"),
        Rule::identifier | Rule::local_name => Some("name"),
        Rule::method_name => Some("method name"),
        Rule::constant => Some("constant"),
        Rule::param_list => Some("parameter list"),
        Rule::call_args => Some("argument list"),
        Rule::block => Some("block (`{ |x| ... }`)"),
        Rule::string | Rule::raw_string => Some("string"),
        Rule::integer | Rule::float => Some("number"),
        Rule::list => Some("list"),
        Rule::kw_end => Some("`end`"),
        Rule::kw_then => Some("`then`"),
        Rule::or
        | Rule::and
        | Rule::eq
        | Rule::ne
        | Rule::le
        | Rule::ge
        | Rule::lt
        | Rule::gt
        | Rule::add
        | Rule::sub
        | Rule::mul
        | Rule::div
        | Rule::rem => Some("operator"),
        Rule::method_call => Some("method call"),
        Rule::index => Some("index"),
        _ => None,
    }
}

/// Compose a human-readable message from the expected rule set.
fn friendly_message(positives: &[Rule]) -> String {
    let mut named: Vec<&str> = Vec::new();
    for label in positives.iter().copied().filter_map(rule_label) {
        if !named.contains(&label) {
            named.push(label);
        }
    }

    match named.as_slice() {
        [] => "unexpected token".to_string(),
        [single] => format!("expected {single}"),
        [a, b] => format!("expected {a} or {b}"),
        many => match many.split_last() {
            Some((last, rest)) => format!("expected {} or {}", rest.join(", "), last),
            None => "unexpected token".to_string(),
        },
    }
}

fn friendly_hint(positives: &[Rule], source_line: Option<&str>) -> Option<String> {
    let line = source_line?;

    let count = |c: char| line.chars().filter(|&x| x == c).count();
    if count('"') % 2 == 1 {
        return Some("A string is missing its closing `\"`.".to_string());
    }
    if count('(') > count(')') {
        return Some("A `(` is never closed.".to_string());
    }
    if count('{') > count('}') {
        return Some("A block `{ ... }` is never closed.".to_string());
    }
    if positives.contains(&Rule::kw_end) {
        return Some("`if` expressions are closed with `end`.".to_string());
    }

    None
}

/// Format the caret underline for an error at `col` with optional `col_end`.
fn underline(col: usize, col_end: Option<usize>) -> String {
    let start = col.saturating_sub(1);
    let len = col_end.map_or(1, |end| end.saturating_sub(col).max(1));
    format!("{}{}", " ".repeat(start), "^".repeat(len))
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "syntax error: {}", self.message)?;

        let location = match &self.origin {
            Some(name) => format!("{name}:{}:{}", self.line, self.col),
            None => format!("{}:{}", self.line, self.col),
        };
        write!(f, "  --> {location}")?;

        if let Some(ref src) = self.source_line {
            let num = self.line.to_string();
            let pad = " ".repeat(num.len());

            writeln!(f)?;
            writeln!(f, "   {pad} |")?;
            writeln!(f, "   {num} | {src}")?;
            write!(f, "   {pad} | {}", underline(self.col, self.col_end))?;
        }

        if let Some(ref hint) = self.hint {
            writeln!(f)?;
            write!(f, "   = hint: {hint}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::{super::ScriptParser, *};
    use pest::Parser;

    fn parse_err(input: &str, origin: Option<&str>) -> ParseError {
        let err = ScriptParser::parse(Rule::program, input)
            .expect_err("expected a parse failure for this input");
        ParseError::from_pest(&err, input, origin)
    }

    #[test]
    fn test_display_includes_origin_and_location() {
        let err = parse_err("\"unclosed string", Some("lib.rexe"));
        let rendered = err.to_string();
        assert!(rendered.contains("lib.rexe:1:"), "origin missing in:\n{rendered}");
        assert!(rendered.contains("syntax error:"), "prefix missing in:\n{rendered}");
        assert!(rendered.contains("-->"), "location arrow missing in:\n{rendered}");
    }

    #[test]
    fn test_display_without_origin() {
        let err = parse_err("1 +", None);
        let rendered = err.to_string();
        assert!(rendered.contains("  --> 1:"), "location missing in:\n{rendered}");
    }

    #[test]
    fn test_source_line_and_caret_present() {
        let input = "upcase(1, 2";
        let err = parse_err(input, Some("-e"));
        let rendered = err.to_string();
        assert!(rendered.contains("upcase(1, 2"), "source line missing in:\n{rendered}");
        assert!(rendered.contains('^'), "caret missing in:\n{rendered}");
    }

    #[test]
    fn test_no_raw_rule_names_in_message() {
        for input in ["\"unclosed", "1 +", "map { |x| x", "if x then 1"] {
            let err = parse_err(input, None);
            assert!(
                !err.message.contains("Rule::") && !err.message.contains("kw_"),
                "raw rule name in message for `{input}`: {}",
                err.message
            );
        }
    }

    #[test]
    fn test_multiline_error_points_to_correct_line() {
        let input = "def ok = 1\nok +";
        let err = parse_err(input, None);
        assert_eq!(err.line, 2, "error should point to second line");
        assert_eq!(err.source_line.as_deref(), Some("ok +"));
    }

    #[test]
    fn test_hint_for_unclosed_paren() {
        let err = parse_err("split(','", None);
        assert_eq!(err.hint.as_deref(), Some("A `(` is never closed."));
    }

    #[test]
    fn test_hint_for_missing_end() {
        let err = parse_err("if x then 1", None);
        assert!(err.hint.is_some());
    }
}
