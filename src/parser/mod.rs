//! Parser implementation using pest
//!
//! This module turns rexe source text (one-liners, `~/.rexerc`, `-l` files and
//! script libraries) into an Abstract Syntax Tree (AST). Operator precedence is
//! handled by a Pratt parser over the flat `expression` rule.

mod error;

pub use error::ParseError;

use crate::ast::{BinaryOp, Block, Expression, Program, Statement, StringPart, UnaryOp};
use once_cell::sync::Lazy;
use pest::Parser;
use pest::error::{Error as PestError, ErrorVariant};
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct ScriptParser;

type BuildResult<T> = Result<T, Box<PestError<Rule>>>;

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not))
});

/// Parse rexe source into an Abstract Syntax Tree (AST)
///
/// `origin` names the source in error messages (a file path, `-e` for the
/// command line, ...).
///
/// # Errors
///
/// Returns `Err` if the input violates the grammar (unbalanced brackets,
/// unterminated strings, a dangling operator, ...) or contains an integer
/// literal that does not fit in 64 bits.
pub fn parse_program(source: &str, origin: Option<&str>) -> Result<Program, ParseError> {
    let to_parse_error = |e: Box<PestError<Rule>>| ParseError::from_pest(&e, source, origin);

    let mut pairs = ScriptParser::parse(Rule::program, source)
        .map_err(|e| to_parse_error(Box::new(e)))?;

    let Some(program) = pairs.next() else {
        return Ok(Program { statements: Vec::new() });
    };

    let mut statements = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::statements {
            statements = build_statements(pair).map_err(to_parse_error)?;
        }
    }

    Ok(Program { statements })
}

fn custom_error(pair: &Pair<Rule>, message: String) -> Box<PestError<Rule>> {
    Box::new(PestError::new_from_span(
        ErrorVariant::CustomError { message },
        pair.as_span(),
    ))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_def
            | Rule::kw_if
            | Rule::kw_then
            | Rule::kw_elsif
            | Rule::kw_else
            | Rule::kw_end
            | Rule::kw_require
    )
}

/// Inner pairs with keyword tokens filtered out
fn significant(pair: Pair<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn build_statements(pair: Pair<Rule>) -> BuildResult<Vec<Statement>> {
    pair.into_inner().map(build_statement).collect()
}

fn build_statement(pair: Pair<Rule>) -> BuildResult<Statement> {
    match pair.as_rule() {
        Rule::function_def => {
            let mut params = Vec::new();
            let mut name = String::new();
            let mut body = Expression::Nil;
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::identifier => name = part.as_str().to_string(),
                    Rule::param_list => params = identifiers(part),
                    Rule::expression => body = build_expression(part)?,
                    _ => {}
                }
            }
            Ok(Statement::FunctionDef { name, params, body })
        }
        Rule::constant_def | Rule::assignment => {
            let is_constant = pair.as_rule() == Rule::constant_def;
            let mut inner = pair.into_inner();
            let name = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            let value = match inner.next() {
                Some(expr) => build_expression(expr)?,
                None => Expression::Nil,
            };
            if is_constant {
                Ok(Statement::ConstantDef { name, value })
            } else {
                Ok(Statement::Assignment { name, value })
            }
        }
        // `require 'name'` is sugar for `require('name')`
        Rule::require_stmt => {
            let args = significant(pair)
                .map(build_primary)
                .collect::<BuildResult<Vec<_>>>()?;
            Ok(Statement::Expression(Expression::Call {
                receiver: None,
                method: "require".to_string(),
                args,
                block: None,
            }))
        }
        _ => Ok(Statement::Expression(build_expression(pair)?)),
    }
}

fn identifiers(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::identifier)
        .map(|p| p.as_str().to_string())
        .collect()
}

fn build_expression(pair: Pair<Rule>) -> BuildResult<Expression> {
    build_operators(pair.into_inner())
}

fn build_operators(pairs: Pairs<Rule>) -> BuildResult<Expression> {
    PRATT
        .map_primary(build_postfix)
        .map_prefix(|op, operand| {
            let op = match op.as_rule() {
                Rule::neg => UnaryOp::Neg,
                _ => UnaryOp::Not,
            };
            Ok(Expression::Unary {
                op,
                operand: Box::new(operand?),
            })
        })
        .map_infix(|left, op, right| {
            let op = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::NotEq,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            Ok(Expression::Binary {
                op,
                left: Box::new(left?),
                right: Box::new(right?),
            })
        })
        .parse(pairs)
}

fn build_postfix(pair: Pair<Rule>) -> BuildResult<Expression> {
    let mut inner = pair.into_inner();
    let Some(first) = inner.next() else {
        return Ok(Expression::Nil);
    };
    let mut expr = build_primary(first)?;

    for suffix in inner {
        expr = match suffix.as_rule() {
            Rule::method_call => {
                let mut parts = suffix.into_inner();
                let method = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                let (args, block) = build_call_tail(parts)?;
                Expression::Call {
                    receiver: Some(Box::new(expr)),
                    method,
                    args,
                    block,
                }
            }
            Rule::index => {
                let index = match suffix.into_inner().next() {
                    Some(p) => build_expression(p)?,
                    None => Expression::Nil,
                };
                Expression::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                }
            }
            _ => expr,
        };
    }

    Ok(expr)
}

/// Arguments and optional block following a method name
fn build_call_tail(parts: Pairs<Rule>) -> BuildResult<(Vec<Expression>, Option<Block>)> {
    let mut args = Vec::new();
    let mut block = None;
    for part in parts {
        match part.as_rule() {
            Rule::call_args => {
                for arg in part.into_inner() {
                    args.push(build_expression(arg)?);
                }
            }
            Rule::block => block = Some(build_block(part)?),
            _ => {}
        }
    }
    Ok((args, block))
}

fn build_block(pair: Pair<Rule>) -> BuildResult<Block> {
    let mut params = Vec::new();
    let mut body = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::block_params => params = identifiers(part),
            Rule::statements => body = build_statements(part)?,
            _ => {}
        }
    }
    Ok(Block { params, body })
}

fn build_primary(pair: Pair<Rule>) -> BuildResult<Expression> {
    match pair.as_rule() {
        Rule::integer => {
            let digits = pair.as_str().replace('_', "");
            digits
                .parse::<i64>()
                .map(Expression::Integer)
                .map_err(|_| custom_error(&pair, format!("integer literal {digits} is too large")))
        }
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(Expression::Float)
            .map_err(|e| custom_error(&pair, format!("invalid float literal: {e}"))),
        Rule::string => build_string(pair),
        Rule::raw_string => {
            let text = pair.into_inner().next().map_or("", |p| p.as_str());
            Ok(Expression::String(
                text.replace("\\'", "'").replace("\\\\", "\\"),
            ))
        }
        Rule::nil_lit => Ok(Expression::Nil),
        Rule::true_lit => Ok(Expression::Bool(true)),
        Rule::false_lit => Ok(Expression::Bool(false)),
        Rule::self_lit => Ok(Expression::SelfRef),
        Rule::list => pair
            .into_inner()
            .map(build_expression)
            .collect::<BuildResult<Vec<_>>>()
            .map(Expression::List),
        Rule::if_expr => build_if(pair),
        Rule::call => {
            let mut parts = pair.into_inner();
            let method = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            let (args, block) = build_call_tail(parts)?;
            Ok(Expression::Call {
                receiver: None,
                method,
                args,
                block,
            })
        }
        Rule::constant => Ok(Expression::Constant(pair.as_str().to_string())),
        Rule::identifier => Ok(Expression::Identifier(pair.as_str().to_string())),
        Rule::expression => build_expression(pair),
        _ => Err(custom_error(&pair, "unexpected token".to_string())),
    }
}

fn build_if(pair: Pair<Rule>) -> BuildResult<Expression> {
    let mut inner = significant(pair);
    let mut branches = Vec::new();
    let mut otherwise = None;

    if let (Some(cond), Some(body)) = (inner.next(), inner.next()) {
        branches.push((build_expression(cond)?, build_statements(body)?));
    }

    for clause in inner {
        match clause.as_rule() {
            Rule::elsif_clause => {
                let mut parts = significant(clause);
                if let (Some(cond), Some(body)) = (parts.next(), parts.next()) {
                    branches.push((build_expression(cond)?, build_statements(body)?));
                }
            }
            Rule::else_clause => {
                if let Some(body) = significant(clause).next() {
                    otherwise = Some(build_statements(body)?);
                }
            }
            _ => {}
        }
    }

    Ok(Expression::If {
        branches,
        otherwise,
    })
}

fn build_string(pair: Pair<Rule>) -> BuildResult<Expression> {
    let mut parts: Vec<StringPart> = Vec::new();
    let mut literal = String::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::string_text => literal.push_str(part.as_str()),
            Rule::escape => literal.push(unescape(part.as_str())),
            Rule::interpolation => {
                if !literal.is_empty() {
                    parts.push(StringPart::Literal(std::mem::take(&mut literal)));
                }
                let code = match part.into_inner().next() {
                    Some(expr) => build_expression(expr)?,
                    None => Expression::Nil,
                };
                parts.push(StringPart::Code(code));
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        return Ok(Expression::String(literal));
    }
    if !literal.is_empty() {
        parts.push(StringPart::Literal(literal));
    }
    Ok(Expression::Interpolated(parts))
}

/// Translate a backslash escape (`\n`, `\t`, ...) to the character it stands for
fn unescape(escape: &str) -> char {
    match escape.chars().nth(1) {
        Some('n') => '\n',
        Some('t') => '\t',
        Some('r') => '\r',
        Some('0') => '\0',
        Some('e') => '\u{1b}',
        Some(other) => other,
        None => '\\',
    }
}
