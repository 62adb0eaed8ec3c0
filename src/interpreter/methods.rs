//! Built-in methods on runtime values
//!
//! Every receiver type has its own dispatch function. Anything not found there
//! falls through to the methods shared by all values; when that fails too the
//! caller gets `EvalError::UndefinedMethod` and may try a user function.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::execution::{apply_binary, compare};
use super::library;
use super::value::Value;
use super::{BlockRef, EvalResult, Interpreter, expect_arity, expect_int, expect_str};
use crate::ast::BinaryOp;
use crate::error::EvalError;
use crate::evaluator::LineStream;

type Block<'a, 'b> = Option<&'a BlockRef<'b>>;

pub(super) fn call(
    interp: &mut Interpreter,
    receiver: &Value,
    method: &str,
    args: &[Value],
    block: Block<'_, '_>,
) -> EvalResult<Value> {
    let result = match receiver {
        Value::Str(s) => string_method(interp, s, method, args, block),
        Value::Int(i) => int_method(interp, *i, method, args, block),
        Value::Float(f) => float_method(*f, method, args),
        Value::List(items) => list_method(interp, items, method, args, block),
        Value::Map(map) => map_method(interp, map, method, args, block),
        Value::Lines(stream) => lines_method(interp, stream, method, args, block),
        Value::Nil => nil_method(method, args),
        Value::Bool(_) | Value::Module(_) => Err(undefined(receiver, method)),
    };
    match result {
        Err(EvalError::UndefinedMethod { method: missing, .. }) if missing == method => {
            common_method(interp, receiver, method, args, block)
        }
        other => other,
    }
}

fn undefined(receiver: &Value, method: &str) -> EvalError {
    EvalError::UndefinedMethod {
        method: method.to_string(),
        receiver: receiver.type_name(),
    }
}

fn require_block<'a, 'b>(method: &str, block: Block<'a, 'b>) -> EvalResult<&'a BlockRef<'b>> {
    block.ok_or_else(|| EvalError::type_error(format!("{method}: no block given")))
}

fn expect_count(method: &str, value: &Value) -> EvalResult<usize> {
    let n = expect_int(method, value)?;
    usize::try_from(n).map_err(|_| EvalError::type_error(format!("{method}: negative size ({n})")))
}

/// Position of `index` in a sequence of `len` items; negative counts from the end
fn resolve_index(len: usize, index: i64) -> Option<usize> {
    if index < 0 {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)
    } else {
        usize::try_from(index).ok().filter(|i| *i < len)
    }
}

fn common_method(
    interp: &mut Interpreter,
    receiver: &Value,
    method: &str,
    args: &[Value],
    block: Block<'_, '_>,
) -> EvalResult<Value> {
    match method {
        "to_s" => {
            expect_arity(method, args, 0, 0)?;
            Ok(Value::Str(receiver.to_s()))
        }
        "inspect" => {
            expect_arity(method, args, 0, 0)?;
            Ok(Value::Str(receiver.inspect()))
        }
        "nil?" => Ok(Value::Bool(matches!(receiver, Value::Nil))),
        "class" => Ok(Value::Str(receiver.type_name().to_string())),
        "itself" | "dup" => Ok(receiver.clone()),
        "then" | "yield_self" => {
            let block = require_block(method, block)?;
            interp.call_block(block, vec![receiver.clone()])
        }
        "tap" => {
            let block = require_block(method, block)?;
            interp.call_block(block, vec![receiver.clone()])?;
            Ok(receiver.clone())
        }
        "to_json" if interp.has_required("json") => library::to_json(receiver),
        _ => Err(undefined(receiver, method)),
    }
}

fn nil_method(method: &str, args: &[Value]) -> EvalResult<Value> {
    let value = match method {
        "to_a" => Value::List(Vec::new()),
        "to_i" => Value::Int(0),
        "to_f" => Value::Float(0.0),
        _ => return Err(undefined(&Value::Nil, method)),
    };
    expect_arity(method, args, 0, 0)?;
    Ok(value)
}

fn regex_replace(
    interp: &mut Interpreter,
    s: &str,
    method: &str,
    args: &[Value],
    block: Block<'_, '_>,
    limit: usize,
) -> EvalResult<Value> {
    let re = interp.regex(expect_str(method, &args[0])?)?;
    if let Some(replacement) = args.get(1) {
        let replacement = expect_str(method, replacement)?;
        return Ok(Value::Str(re.replacen(s, limit, replacement).into_owned()));
    }

    let block = require_block(method, block)?;
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for m in re.find_iter(s).take(limit) {
        out.push_str(&s[last..m.start()]);
        let replaced = interp.call_block(block, vec![Value::Str(m.as_str().to_string())])?;
        out.push_str(&replaced.to_s());
        last = m.end();
    }
    out.push_str(&s[last..]);
    Ok(Value::Str(out))
}

/// Leading number in `s`, the way `to_i`/`to_f` read it ("12abc" is 12)
fn numeric_prefix(s: &str, allow_fraction: bool) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if allow_fraction
        && end > digits_start
        && bytes.get(end) == Some(&b'.')
        && bytes.get(end + 1).is_some_and(u8::is_ascii_digit)
    {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start { "" } else { &s[..end] }
}

fn pad(s: &str, method: &str, args: &[Value]) -> EvalResult<Value> {
    expect_arity(method, args, 1, 2)?;
    let width = expect_count(method, &args[0])?;
    let filler = match args.get(1) {
        Some(v) => expect_str(method, v)?,
        None => " ",
    };
    let len = s.chars().count();
    if width <= len || filler.is_empty() {
        return Ok(Value::Str(s.to_string()));
    }
    let fill = |n: usize| filler.chars().cycle().take(n).collect::<String>();
    let missing = width - len;
    Ok(Value::Str(match method {
        "ljust" => format!("{s}{}", fill(missing)),
        "rjust" => format!("{}{s}", fill(missing)),
        _ => format!("{}{s}{}", fill(missing / 2), fill(missing - missing / 2)),
    }))
}

fn str_value(text: &str) -> Value {
    Value::Str(text.to_string())
}

fn strings(parts: Vec<&str>) -> Value {
    Value::List(parts.into_iter().map(str_value).collect())
}

#[allow(clippy::too_many_lines)]
fn string_method(
    interp: &mut Interpreter,
    s: &str,
    method: &str,
    args: &[Value],
    block: Block<'_, '_>,
) -> EvalResult<Value> {
    match method {
        "length" | "size" => Ok(Value::Int(i64::try_from(s.chars().count()).unwrap_or(i64::MAX))),
        "upcase" => Ok(Value::Str(s.to_uppercase())),
        "downcase" => Ok(Value::Str(s.to_lowercase())),
        "capitalize" => {
            let mut chars = s.chars();
            Ok(Value::Str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            }))
        }
        "reverse" => Ok(Value::Str(s.chars().rev().collect())),
        "strip" => Ok(str_value(s.trim())),
        "lstrip" => Ok(str_value(s.trim_start())),
        "rstrip" => Ok(str_value(s.trim_end())),
        "chomp" => {
            expect_arity(method, args, 0, 1)?;
            if let Some(suffix) = args.first() {
                let suffix = expect_str(method, suffix)?;
                return Ok(str_value(s.strip_suffix(suffix).unwrap_or(s)));
            }
            let chomped = s
                .strip_suffix("\r\n")
                .or_else(|| s.strip_suffix('\n'))
                .or_else(|| s.strip_suffix('\r'))
                .unwrap_or(s);
            Ok(str_value(chomped))
        }
        "chars" => Ok(Value::List(s.chars().map(|c| Value::Str(c.to_string())).collect())),
        "lines" => Ok(strings(s.split_inclusive('\n').collect())),
        "split" => {
            expect_arity(method, args, 0, 1)?;
            let separator = match args.first() {
                Some(v) => expect_str(method, v)?,
                None => " ",
            };
            if separator == " " {
                return Ok(strings(s.split_whitespace().collect()));
            }
            let mut parts: Vec<&str> = if separator.is_empty() {
                s.char_indices().map(|(i, c)| &s[i..i + c.len_utf8()]).collect()
            } else {
                s.split(separator).collect()
            };
            while parts.last().is_some_and(|p| p.is_empty()) {
                parts.pop();
            }
            Ok(strings(parts))
        }
        "to_i" => Ok(Value::Int(numeric_prefix(s, false).parse().unwrap_or(0))),
        "to_f" => Ok(Value::Float(numeric_prefix(s, true).parse().unwrap_or(0.0))),
        "to_str" => Ok(str_value(s)),
        "ord" => s
            .chars()
            .next()
            .map(|c| Value::Int(i64::from(u32::from(c))))
            .ok_or_else(|| EvalError::type_error("ord: empty string")),
        "include?" => {
            expect_arity(method, args, 1, 1)?;
            Ok(Value::Bool(s.contains(expect_str(method, &args[0])?)))
        }
        "start_with?" => {
            expect_arity(method, args, 1, 1)?;
            Ok(Value::Bool(s.starts_with(expect_str(method, &args[0])?)))
        }
        "end_with?" => {
            expect_arity(method, args, 1, 1)?;
            Ok(Value::Bool(s.ends_with(expect_str(method, &args[0])?)))
        }
        "empty?" => Ok(Value::Bool(s.is_empty())),
        "sub" => {
            expect_arity(method, args, 1, 2)?;
            regex_replace(interp, s, method, args, block, 1)
        }
        "gsub" => {
            expect_arity(method, args, 1, 2)?;
            regex_replace(interp, s, method, args, block, usize::MAX)
        }
        "match?" => {
            expect_arity(method, args, 1, 1)?;
            let re = interp.regex(expect_str(method, &args[0])?)?;
            Ok(Value::Bool(re.is_match(s)))
        }
        "scan" => {
            expect_arity(method, args, 1, 1)?;
            let re = interp.regex(expect_str(method, &args[0])?)?;
            if re.captures_len() > 1 {
                let groups = re
                    .captures_iter(s)
                    .map(|caps| {
                        Value::List(
                            caps.iter()
                                .skip(1)
                                .map(|g| g.map_or(Value::Nil, |m| str_value(m.as_str())))
                                .collect(),
                        )
                    })
                    .collect();
                Ok(Value::List(groups))
            } else {
                Ok(strings(re.find_iter(s).map(|m| m.as_str()).collect()))
            }
        }
        "ljust" | "rjust" | "center" => pad(s, method, args),
        "[]" => {
            expect_arity(method, args, 1, 1)?;
            match &args[0] {
                Value::Int(i) => {
                    let chars: Vec<char> = s.chars().collect();
                    Ok(resolve_index(chars.len(), *i).map_or(Value::Nil, |i| Value::Str(chars[i].to_string())))
                }
                Value::Str(needle) if s.contains(needle.as_str()) => Ok(str_value(needle)),
                Value::Str(_) => Ok(Value::Nil),
                other => Err(EvalError::type_error(format!(
                    "no implicit conversion of {} into Integer",
                    other.type_name()
                ))),
            }
        }
        _ => Err(EvalError::UndefinedMethod {
            method: method.to_string(),
            receiver: "String",
        }),
    }
}

fn to_radix(mut n: u64, base: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        #[allow(clippy::cast_possible_truncation)]
        out.push(DIGITS[(n % u64::from(base)) as usize]);
        n /= u64::from(base);
    }
    out.iter().rev().map(|&b| char::from(b)).collect()
}

fn int_method(
    interp: &mut Interpreter,
    i: i64,
    method: &str,
    args: &[Value],
    block: Block<'_, '_>,
) -> EvalResult<Value> {
    match method {
        "abs" => i.checked_abs().map(Value::Int).ok_or_else(|| EvalError::type_error("integer overflow")),
        "to_s" if !args.is_empty() => {
            expect_arity(method, args, 1, 1)?;
            let base = expect_int(method, &args[0])?;
            let base = u32::try_from(base)
                .ok()
                .filter(|b| (2..=36).contains(b))
                .ok_or_else(|| EvalError::type_error(format!("invalid radix {base}")))?;
            let digits = to_radix(i.unsigned_abs(), base);
            Ok(Value::Str(if i < 0 { format!("-{digits}") } else { digits }))
        }
        "to_i" | "round" | "floor" | "ceil" | "truncate" => Ok(Value::Int(i)),
        #[allow(clippy::cast_precision_loss)]
        "to_f" => Ok(Value::Float(i as f64)),
        "chr" => u32::try_from(i)
            .ok()
            .and_then(char::from_u32)
            .map(|c| Value::Str(c.to_string()))
            .ok_or_else(|| EvalError::type_error(format!("{i} out of char range"))),
        "even?" => Ok(Value::Bool(i % 2 == 0)),
        "odd?" => Ok(Value::Bool(i % 2 != 0)),
        "zero?" => Ok(Value::Bool(i == 0)),
        "positive?" => Ok(Value::Bool(i > 0)),
        "negative?" => Ok(Value::Bool(i < 0)),
        "succ" | "next" => apply_binary(BinaryOp::Add, &Value::Int(i), &Value::Int(1)),
        "pred" => apply_binary(BinaryOp::Sub, &Value::Int(i), &Value::Int(1)),
        "times" => {
            let range: Vec<Value> = (0..i.max(0)).map(Value::Int).collect();
            match block {
                Some(block) => {
                    for n in range {
                        interp.call_block(block, vec![n])?;
                    }
                    Ok(Value::Int(i))
                }
                None => Ok(Value::List(range)),
            }
        }
        "upto" => {
            expect_arity(method, args, 1, 1)?;
            let end = expect_int(method, &args[0])?;
            Ok(Value::List((i..=end).map(Value::Int).collect()))
        }
        "between?" => {
            expect_arity(method, args, 2, 2)?;
            let value = Value::Int(i);
            Ok(Value::Bool(
                compare(&value, &args[0])? != Ordering::Less && compare(&value, &args[1])? != Ordering::Greater,
            ))
        }
        _ => Err(EvalError::UndefinedMethod {
            method: method.to_string(),
            receiver: "Integer",
        }),
    }
}

/// Convert to an integer, refusing NaN and values out of range
fn float_to_int(f: f64) -> EvalResult<Value> {
    #[allow(clippy::cast_precision_loss)]
    let in_range = f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64;
    if !in_range {
        return Err(EvalError::type_error(format!("FloatDomainError: {}", Value::Float(f).to_s())));
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(Value::Int(f as i64))
}

fn float_method(f: f64, method: &str, args: &[Value]) -> EvalResult<Value> {
    match method {
        "abs" => Ok(Value::Float(f.abs())),
        "round" => {
            expect_arity(method, args, 0, 1)?;
            match args.first() {
                None => float_to_int(f.round()),
                Some(digits) => {
                    let digits = expect_int(method, digits)?;
                    let factor = 10f64.powi(i32::try_from(digits.clamp(-300, 300)).unwrap_or(0));
                    Ok(Value::Float((f * factor).round() / factor))
                }
            }
        }
        "floor" => float_to_int(f.floor()),
        "ceil" => float_to_int(f.ceil()),
        "to_i" | "truncate" => float_to_int(f.trunc()),
        "to_f" => Ok(Value::Float(f)),
        "nan?" => Ok(Value::Bool(f.is_nan())),
        "infinite?" => Ok(Value::Bool(f.is_infinite())),
        "zero?" => Ok(Value::Bool(f == 0.0)),
        "positive?" => Ok(Value::Bool(f > 0.0)),
        "negative?" => Ok(Value::Bool(f < 0.0)),
        _ => Err(EvalError::UndefinedMethod {
            method: method.to_string(),
            receiver: "Float",
        }),
    }
}

/// Sort with a fallible comparison, reporting the first failure
fn sort_values(items: &mut [Value], mut cmp: impl FnMut(&Value, &Value) -> EvalResult<Ordering>) -> EvalResult<()> {
    let mut failure = None;
    items.sort_by(|a, b| match cmp(a, b) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Pair each item with the block's result for it
fn keyed(interp: &mut Interpreter, items: &[Value], block: &BlockRef<'_>) -> EvalResult<Vec<(Value, Value)>> {
    items
        .iter()
        .map(|item| Ok((interp.call_block(block, vec![item.clone()])?, item.clone())))
        .collect()
}

fn extreme_by(
    interp: &mut Interpreter,
    items: &[Value],
    block: &BlockRef<'_>,
    wanted: Ordering,
) -> EvalResult<Value> {
    let mut best: Option<(Value, Value)> = None;
    for (key, item) in keyed(interp, items, block)? {
        let replace = match &best {
            Some((best_key, _)) => compare(&key, best_key)? == wanted,
            None => true,
        };
        if replace {
            best = Some((key, item));
        }
    }
    Ok(best.map_or(Value::Nil, |(_, item)| item))
}

fn extreme(items: &[Value], wanted: Ordering) -> EvalResult<Value> {
    let mut best: Option<&Value> = None;
    for item in items {
        best = match best {
            Some(b) if compare(item, b)? != wanted => Some(b),
            _ => Some(item),
        };
    }
    Ok(best.cloned().unwrap_or(Value::Nil))
}

fn select(
    interp: &mut Interpreter,
    items: &[Value],
    block: &BlockRef<'_>,
    keep: bool,
) -> EvalResult<Vec<Value>> {
    let mut out = Vec::new();
    for item in items {
        if interp.call_block(block, vec![item.clone()])?.is_truthy() == keep {
            out.push(item.clone());
        }
    }
    Ok(out)
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::List(inner) => flatten_into(inner, out),
            other => out.push(other.clone()),
        }
    }
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::List(inner) => join(inner, separator),
            other => other.to_s(),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Map keys are strings; anything else is keyed by its `to_s`
fn map_key(value: &Value) -> String {
    value.to_s()
}

fn truth_test(
    interp: &mut Interpreter,
    items: &[Value],
    block: Block<'_, '_>,
) -> EvalResult<Vec<bool>> {
    items
        .iter()
        .map(|item| match block {
            Some(block) => Ok(interp.call_block(block, vec![item.clone()])?.is_truthy()),
            None => Ok(item.is_truthy()),
        })
        .collect()
}

#[allow(clippy::too_many_lines)]
fn list_method(
    interp: &mut Interpreter,
    items: &[Value],
    method: &str,
    args: &[Value],
    block: Block<'_, '_>,
) -> EvalResult<Value> {
    let len_value = |n: usize| Value::Int(i64::try_from(n).unwrap_or(i64::MAX));

    match method {
        "length" | "size" => Ok(len_value(items.len())),
        "count" => match (args.first(), block) {
            (Some(needle), _) => Ok(len_value(items.iter().filter(|i| i.equals(needle)).count())),
            (None, Some(block)) => Ok(len_value(select(interp, items, block, true)?.len())),
            (None, None) => Ok(len_value(items.len())),
        },
        "first" | "last" if args.is_empty() => {
            let item = if method == "first" { items.first() } else { items.last() };
            Ok(item.cloned().unwrap_or(Value::Nil))
        }
        "first" | "take" => {
            expect_arity(method, args, 1, 1)?;
            let n = expect_count(method, &args[0])?;
            Ok(Value::List(items.iter().take(n).cloned().collect()))
        }
        "last" => {
            expect_arity(method, args, 1, 1)?;
            let n = expect_count(method, &args[0])?;
            Ok(Value::List(items[items.len().saturating_sub(n)..].to_vec()))
        }
        "drop" => {
            expect_arity(method, args, 1, 1)?;
            let n = expect_count(method, &args[0])?;
            Ok(Value::List(items.iter().skip(n).cloned().collect()))
        }
        "reverse" => Ok(Value::List(items.iter().rev().cloned().collect())),
        "sort" => {
            let mut sorted = items.to_vec();
            match block {
                Some(block) => sort_values(&mut sorted, |a, b| {
                    let result = interp.call_block(block, vec![a.clone(), b.clone()])?;
                    Ok(expect_int(method, &result)?.cmp(&0))
                })?,
                None => sort_values(&mut sorted, compare)?,
            }
            Ok(Value::List(sorted))
        }
        "sort_by" => {
            let block = require_block(method, block)?;
            let mut pairs = keyed(interp, items, block)?;
            let mut failure = None;
            pairs.sort_by(|(a, _), (b, _)| {
                compare(a, b).unwrap_or_else(|e| {
                    failure.get_or_insert(e);
                    Ordering::Equal
                })
            });
            if let Some(e) = failure {
                return Err(e);
            }
            Ok(Value::List(pairs.into_iter().map(|(_, item)| item).collect()))
        }
        "min" => extreme(items, Ordering::Less),
        "max" => extreme(items, Ordering::Greater),
        "min_by" => extreme_by(interp, items, require_block(method, block)?, Ordering::Less),
        "max_by" => extreme_by(interp, items, require_block(method, block)?, Ordering::Greater),
        "sum" => {
            let mut total = args.first().cloned().unwrap_or(Value::Int(0));
            for item in items {
                let item = match block {
                    Some(block) => interp.call_block(block, vec![item.clone()])?,
                    None => item.clone(),
                };
                total = apply_binary(BinaryOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "uniq" => {
            let mut seen: Vec<Value> = Vec::new();
            let mut out = Vec::new();
            for item in items {
                let key = match block {
                    Some(block) => interp.call_block(block, vec![item.clone()])?,
                    None => item.clone(),
                };
                if !seen.iter().any(|s| s.equals(&key)) {
                    seen.push(key);
                    out.push(item.clone());
                }
            }
            Ok(Value::List(out))
        }
        "join" => {
            expect_arity(method, args, 0, 1)?;
            let separator = match args.first() {
                Some(v) => expect_str(method, v)?,
                None => "",
            };
            Ok(Value::Str(join(items, separator)))
        }
        "map" | "collect" => {
            let block = require_block(method, block)?;
            items
                .iter()
                .map(|item| interp.call_block(block, vec![item.clone()]))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::List)
        }
        "flat_map" => {
            let block = require_block(method, block)?;
            let mut out = Vec::new();
            for item in items {
                match interp.call_block(block, vec![item.clone()])? {
                    Value::List(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Ok(Value::List(out))
        }
        "select" | "filter" => select(interp, items, require_block(method, block)?, true).map(Value::List),
        "reject" => select(interp, items, require_block(method, block)?, false).map(Value::List),
        "find" | "detect" => {
            let block = require_block(method, block)?;
            for item in items {
                if interp.call_block(block, vec![item.clone()])?.is_truthy() {
                    return Ok(item.clone());
                }
            }
            Ok(Value::Nil)
        }
        "index" => {
            expect_arity(method, args, 0, 1)?;
            for (i, item) in items.iter().enumerate() {
                let hit = match (args.first(), block) {
                    (Some(needle), _) => item.equals(needle),
                    (None, Some(block)) => interp.call_block(block, vec![item.clone()])?.is_truthy(),
                    (None, None) => false,
                };
                if hit {
                    return Ok(len_value(i));
                }
            }
            Ok(Value::Nil)
        }
        "any?" => Ok(Value::Bool(truth_test(interp, items, block)?.into_iter().any(|t| t))),
        "all?" => Ok(Value::Bool(truth_test(interp, items, block)?.into_iter().all(|t| t))),
        "none?" => Ok(Value::Bool(!truth_test(interp, items, block)?.into_iter().any(|t| t))),
        "include?" | "member?" => {
            expect_arity(method, args, 1, 1)?;
            Ok(Value::Bool(items.iter().any(|item| item.equals(&args[0]))))
        }
        "empty?" => Ok(Value::Bool(items.is_empty())),
        "flatten" => {
            let mut out = Vec::new();
            flatten_into(items, &mut out);
            Ok(Value::List(out))
        }
        "compact" => Ok(Value::List(
            items.iter().filter(|item| !matches!(item, Value::Nil)).cloned().collect(),
        )),
        "each" => {
            let block = require_block(method, block)?;
            for item in items {
                interp.call_block(block, vec![item.clone()])?;
            }
            Ok(Value::List(items.to_vec()))
        }
        "each_with_index" | "with_index" => {
            let pairs: Vec<Value> = items
                .iter()
                .enumerate()
                .map(|(i, item)| Value::List(vec![item.clone(), len_value(i)]))
                .collect();
            match block {
                Some(block) => {
                    for pair in pairs {
                        interp.call_block(block, vec![pair])?;
                    }
                    Ok(Value::List(items.to_vec()))
                }
                None => Ok(Value::List(pairs)),
            }
        }
        "each_slice" => {
            expect_arity(method, args, 1, 1)?;
            let n = expect_count(method, &args[0])?;
            if n == 0 {
                return Err(EvalError::type_error("each_slice: invalid slice size"));
            }
            let slices: Vec<Value> = items.chunks(n).map(|c| Value::List(c.to_vec())).collect();
            match block {
                Some(block) => slices
                    .into_iter()
                    .map(|slice| interp.call_block(block, vec![slice]))
                    .collect::<EvalResult<Vec<_>>>()
                    .map(Value::List),
                None => Ok(Value::List(slices)),
            }
        }
        "tally" => {
            let mut counts: BTreeMap<String, Value> = BTreeMap::new();
            for item in items {
                let entry = counts.entry(map_key(item)).or_insert(Value::Int(0));
                if let Value::Int(n) = entry {
                    *n += 1;
                }
            }
            Ok(Value::Map(counts))
        }
        "group_by" => {
            let block = require_block(method, block)?;
            let mut groups: BTreeMap<String, Value> = BTreeMap::new();
            for (key, item) in keyed(interp, items, block)? {
                let entry = groups.entry(map_key(&key)).or_insert_with(|| Value::List(Vec::new()));
                if let Value::List(members) = entry {
                    members.push(item);
                }
            }
            Ok(Value::Map(groups))
        }
        "partition" => {
            let block = require_block(method, block)?;
            let (mut yes, mut no) = (Vec::new(), Vec::new());
            for item in items {
                if interp.call_block(block, vec![item.clone()])?.is_truthy() {
                    yes.push(item.clone());
                } else {
                    no.push(item.clone());
                }
            }
            Ok(Value::List(vec![Value::List(yes), Value::List(no)]))
        }
        "inject" | "reduce" => {
            expect_arity(method, args, 0, 1)?;
            let block = require_block(method, block)?;
            let mut rest = items.iter();
            let mut acc = match args.first() {
                Some(initial) => initial.clone(),
                None => match rest.next() {
                    Some(first) => first.clone(),
                    None => return Ok(Value::Nil),
                },
            };
            for item in rest {
                acc = interp.call_block(block, vec![acc, item.clone()])?;
            }
            Ok(acc)
        }
        "zip" => {
            let others = args
                .iter()
                .map(|arg| match arg {
                    Value::List(other) => Ok(other.as_slice()),
                    other => Err(EvalError::type_error(format!(
                        "zip: wrong argument type {} (must respond to :each)",
                        other.type_name()
                    ))),
                })
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let mut row = vec![item.clone()];
                        row.extend(others.iter().map(|o| o.get(i).cloned().unwrap_or(Value::Nil)));
                        Value::List(row)
                    })
                    .collect(),
            ))
        }
        "to_a" | "entries" => Ok(Value::List(items.to_vec())),
        "to_h" => {
            let mut map = BTreeMap::new();
            for item in items {
                match item {
                    Value::List(pair) if pair.len() == 2 => {
                        map.insert(map_key(&pair[0]), pair[1].clone());
                    }
                    other => {
                        return Err(EvalError::type_error(format!(
                            "wrong element type {} (expected array of 2 elements)",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::Map(map))
        }
        "[]" => {
            expect_arity(method, args, 1, 1)?;
            let index = expect_int(method, &args[0])?;
            Ok(resolve_index(items.len(), index).map_or(Value::Nil, |i| items[i].clone()))
        }
        _ => Err(EvalError::UndefinedMethod {
            method: method.to_string(),
            receiver: "Array",
        }),
    }
}

fn pairs_of(map: &BTreeMap<String, Value>) -> Vec<Value> {
    map.iter()
        .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
        .collect()
}

fn map_method(
    interp: &mut Interpreter,
    map: &BTreeMap<String, Value>,
    method: &str,
    args: &[Value],
    block: Block<'_, '_>,
) -> EvalResult<Value> {
    match method {
        "keys" => Ok(Value::List(map.keys().cloned().map(Value::Str).collect())),
        "values" => Ok(Value::List(map.values().cloned().collect())),
        "length" | "size" => Ok(Value::Int(i64::try_from(map.len()).unwrap_or(i64::MAX))),
        "empty?" => Ok(Value::Bool(map.is_empty())),
        "[]" => {
            expect_arity(method, args, 1, 1)?;
            Ok(map.get(&map_key(&args[0])).cloned().unwrap_or(Value::Nil))
        }
        "fetch" => {
            expect_arity(method, args, 1, 2)?;
            match (map.get(&map_key(&args[0])), args.get(1)) {
                (Some(value), _) => Ok(value.clone()),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(EvalError::type_error(format!("key not found: {}", args[0].inspect()))),
            }
        }
        "key?" | "has_key?" | "include?" => {
            expect_arity(method, args, 1, 1)?;
            Ok(Value::Bool(map.contains_key(&map_key(&args[0]))))
        }
        "to_a" => Ok(Value::List(pairs_of(map))),
        "to_h" => Ok(Value::Map(map.clone())),
        "select" | "filter" | "reject" => {
            let block = require_block(method, block)?;
            let keep = method != "reject";
            let mut out = BTreeMap::new();
            for (k, v) in map {
                let verdict = interp.call_block(block, vec![Value::Str(k.clone()), v.clone()])?;
                if verdict.is_truthy() == keep {
                    out.insert(k.clone(), v.clone());
                }
            }
            Ok(Value::Map(out))
        }
        "transform_values" => {
            let block = require_block(method, block)?;
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), interp.call_block(block, vec![v.clone()])?);
            }
            Ok(Value::Map(out))
        }
        "merge" => {
            let mut out = map.clone();
            for arg in args {
                let Value::Map(other) = arg else {
                    return Err(EvalError::type_error(format!(
                        "no implicit conversion of {} into Hash",
                        arg.type_name()
                    )));
                };
                out.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Ok(Value::Map(out))
        }
        "each" => {
            let block = require_block(method, block)?;
            for (k, v) in map {
                interp.call_block(block, vec![Value::Str(k.clone()), v.clone()])?;
            }
            Ok(Value::Map(map.clone()))
        }
        // everything else works on the [key, value] pairs
        _ => list_method(interp, &pairs_of(map), method, args, block).map_err(|e| match e {
            EvalError::UndefinedMethod { method, .. } => EvalError::UndefinedMethod {
                method,
                receiver: "Hash",
            },
            other => other,
        }),
    }
}

fn drain(stream: &RefCell<LineStream>) -> EvalResult<Vec<Value>> {
    let lines = stream
        .borrow_mut()
        .by_ref()
        .map(|line| line.map(Value::Str))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

/// Methods on the enumerator mode receiver. `next`, `first` and `take` read
/// only what they need; anything else drains the stream into a list.
fn lines_method(
    interp: &mut Interpreter,
    stream: &Rc<RefCell<LineStream>>,
    method: &str,
    args: &[Value],
    block: Block<'_, '_>,
) -> EvalResult<Value> {
    match method {
        "next" | "first" if args.is_empty() => {
            let line = stream.borrow_mut().next().transpose()?;
            Ok(line.map_or(Value::Nil, Value::Str))
        }
        "first" | "take" => {
            expect_arity(method, args, 1, 1)?;
            let n = expect_count(method, &args[0])?;
            let lines = stream
                .borrow_mut()
                .by_ref()
                .take(n)
                .map(|line| line.map(Value::Str))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(lines))
        }
        "to_s" | "inspect" | "class" | "nil?" | "itself" => {
            common_method(interp, &Value::Lines(Rc::clone(stream)), method, args, block)
        }
        _ => {
            let lines = drain(stream)?;
            list_method(interp, &lines, method, args, block).map_err(|e| match e {
                EvalError::UndefinedMethod { method, .. } => EvalError::UndefinedMethod {
                    method,
                    receiver: "Enumerator",
                },
                other => other,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::evaluator::{Context, ScriptEvaluator};

    fn eval(code: &str, context: Context) -> EvalResult<Value> {
        let mut interp = Interpreter::new();
        let unit = interp.compile(code)?;
        interp.invoke(&unit, context)
    }

    fn inspect(code: &str) -> String {
        eval(code, Context::None).unwrap().inspect()
    }

    fn on_line(code: &str, line: &str) -> String {
        eval(code, Context::Line(line.to_string())).unwrap().to_s()
    }

    #[test]
    fn test_string_case_and_trim() {
        assert_eq!(on_line("capitalize", "hELLO"), "Hello");
        assert_eq!(on_line("strip.reverse", "  abc "), "cba");
        assert_eq!(on_line("chomp", "x\r\n"), "x");
        assert_eq!(on_line("chomp('.txt')", "a.txt"), "a");
    }

    #[test]
    fn test_string_split() {
        assert_eq!(inspect("' a  b c '.split"), r#"["a", "b", "c"]"#);
        assert_eq!(inspect("'a,b,,c,,'.split(',')"), r#"["a", "b", "", "c"]"#);
        assert_eq!(inspect("'ab'.chars"), r#"["a", "b"]"#);
        assert_eq!(inspect(r#""x\ny\n".lines"#), r#"["x\n", "y\n"]"#);
    }

    #[test]
    fn test_string_numbers() {
        assert_eq!(inspect("'42abc'.to_i"), "42");
        assert_eq!(inspect("'-3.5kg'.to_f"), "-3.5");
        assert_eq!(inspect("'abc'.to_i"), "0");
    }

    #[test]
    fn test_regex_methods() {
        assert_eq!(on_line(r"gsub('\d', '#')", "a1b22"), "a#b##");
        assert_eq!(on_line(r"sub('(\w+)@', '$1 at ')", "me@host"), "me at host");
        assert_eq!(on_line(r"gsub('[aeiou]') { |v| v.upcase }", "banana"), "bAnAnA");
        assert_eq!(inspect(r"'a1b22'.scan('\d+')"), r#"["1", "22"]"#);
        assert_eq!(inspect(r"'k=v x=y'.scan('(\w)=(\w)')"), r#"[["k", "v"], ["x", "y"]]"#);
        assert_eq!(inspect(r"'abc'.match?('^a')"), "true");
    }

    #[test]
    fn test_bad_regex_is_an_error() {
        let err = eval("'x'.match?('(')", Context::None).unwrap_err();
        assert!(matches!(err, EvalError::Regex(_)));
    }

    #[test]
    fn test_padding_and_index() {
        assert_eq!(inspect("'ab'.rjust(4, '.')"), r#""..ab""#);
        assert_eq!(inspect("'ab'.ljust(3)"), r#""ab ""#);
        assert_eq!(inspect("'abc'[-1]"), r#""c""#);
        assert_eq!(inspect("'abc'[5]"), "nil");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(inspect("255.to_s(16)"), r#""ff""#);
        assert_eq!(inspect("3.times"), "[0, 1, 2]");
        assert_eq!(inspect("2.7.round"), "3");
        assert_eq!(inspect("3.14159.round(2)"), "3.14");
        assert_eq!(inspect("(-7).abs"), "7");
        assert_eq!(inspect("-7.abs"), "-7");
        assert!(eval("(0.0 / 0.0).to_i", Context::None).is_err());
    }

    #[test]
    fn test_list_transformations() {
        assert_eq!(inspect("[3, 1, 2].sort.reverse"), "[3, 2, 1]");
        assert_eq!(inspect("['bb', 'a', 'ccc'].sort_by { |s| s.size }"), r#"["a", "bb", "ccc"]"#);
        assert_eq!(inspect("[1, 2, 3, 4].select { |x| x.even? }"), "[2, 4]");
        assert_eq!(inspect("[1, [2, [3]], nil].flatten.compact"), "[1, 2, 3]");
        assert_eq!(inspect("[1, 2, 3].sum"), "6");
        assert_eq!(inspect("[1, 2, 3].inject { |a, b| a * b }"), "6");
        assert_eq!(inspect("['a', 'b'].each_with_index.map { |s, i| s * (i + 1) }"), r#"["a", "bb"]"#);
        assert_eq!(inspect("[1, 2, 3, 4, 5].each_slice(2)"), "[[1, 2], [3, 4], [5]]");
        assert_eq!(inspect("[1, 2].zip([3, 4])"), "[[1, 3], [2, 4]]");
    }

    #[test]
    fn test_list_queries() {
        assert_eq!(inspect("[].max"), "nil");
        assert_eq!(inspect("[2, 9, 4].max"), "9");
        assert_eq!(inspect("['aa', 'b'].min_by { |s| s.size }"), r#""b""#);
        assert_eq!(inspect("[1, 2].any? { |x| x > 1 }"), "true");
        assert_eq!(inspect("[nil, 1].all?"), "false");
        assert_eq!(inspect("[1, 2, 3][-1]"), "3");
        assert_eq!(inspect("[1, 2, 3].first(2)"), "[1, 2]");
        assert!(eval("[1, 'a'].max", Context::None).is_err());
    }

    #[test]
    fn test_tally_and_group_by() {
        assert_eq!(inspect("['a', 'b', 'a'].tally"), r#"{"a" => 2, "b" => 1}"#);
        assert_eq!(
            inspect("[1, 2, 3].group_by { |x| x.odd? }"),
            r#"{"false" => [2], "true" => [1, 3]}"#
        );
    }

    #[test]
    fn test_map_methods() {
        assert_eq!(inspect("[['b', 2], ['a', 1]].to_h.keys"), r#"["a", "b"]"#);
        assert_eq!(inspect("[['a', 1]].to_h['a']"), "1");
        assert_eq!(inspect("[['a', 1], ['b', 2]].to_h.select { |k, v| v > 1 }"), r#"{"b" => 2}"#);
        assert_eq!(inspect("[['a', 1], ['b', 2]].to_h.map { |k, v| k * v }"), r#"["a", "bb"]"#);
        assert!(eval("[['a', 1]].to_h.fetch('z')", Context::None).is_err());
    }

    #[test]
    fn test_lines_receiver() {
        let stream = || LineStream::new(std::io::Cursor::new("one\ntwo\nthree\n"));
        let first = eval("take(2)", Context::Lines(stream())).unwrap();
        assert_eq!(first.inspect(), r#"["one\n", "two\n"]"#);
        let count = eval("count", Context::Lines(stream())).unwrap();
        assert_eq!(count.inspect(), "3");
        let grep = eval("select { |l| l.include?('t') }.map { |l| l.chomp }", Context::Lines(stream())).unwrap();
        assert_eq!(grep.inspect(), r#"["two", "three"]"#);
    }

    #[test]
    fn test_block_required() {
        let err = eval("[1].map", Context::None).unwrap_err();
        assert_eq!(err.to_string(), "map: no block given");
    }

    #[test]
    fn test_common_methods() {
        assert_eq!(inspect("nil.nil?"), "true");
        assert_eq!(inspect("1.class"), r#""Integer""#);
        assert_eq!(inspect("5.then { |x| x * 2 }"), "10");
        assert_eq!(inspect("[1, 'a', nil].inspect"), r#""[1, \"a\", nil]""#);
    }
}
