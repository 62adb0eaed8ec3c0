//! Libraries available to `require`.
//!
//! A few libraries are built in and expose a module constant (`JSON`, `Math`,
//! `Shellwords`). Any other name is resolved to a script file, either directly
//! as a path or as `NAME.rexe` inside one of the search directories.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use super::value::Value;
use super::{EvalResult, expect_arity, expect_str};
use crate::error::EvalError;

/// Extension of script libraries looked up on the search path.
pub const LIBRARY_EXTENSION: &str = "rexe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Json,
    Math,
    Shellwords,
}

struct BuiltinLibrary {
    name: &'static str,
    module: Module,
}

static BUILTINS: Lazy<Vec<BuiltinLibrary>> = Lazy::new(|| {
    vec![
        BuiltinLibrary { name: "json", module: Module::Json },
        BuiltinLibrary { name: "math", module: Module::Math },
        BuiltinLibrary { name: "shellwords", module: Module::Shellwords },
    ]
});

/// The module a built-in library provides, if `name` is one.
pub(super) fn builtin(name: &str) -> Option<Module> {
    BUILTINS.iter().find(|lib| lib.name == name).map(|lib| lib.module)
}

/// Locate a script library on disk.
///
/// `name` is tried as a path first; otherwise `name.rexe` is looked up in each
/// search directory, in order.
pub(super) fn find_file(name: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.is_file() {
        return Some(direct.to_path_buf());
    }

    let file_name = if direct.extension().is_some() {
        name.to_string()
    } else {
        format!("{name}.{LIBRARY_EXTENSION}")
    };

    search_path
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

impl Module {
    /// The constant the module is bound to
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Math => "Math",
            Self::Shellwords => "Shellwords",
        }
    }

    pub(super) fn call(self, method: &str, args: &[Value]) -> EvalResult<Value> {
        if method == "name" || method == "to_s" {
            expect_arity(method, args, 0, 0)?;
            return Ok(Value::Str(self.name().to_string()));
        }
        match self {
            Self::Json => call_json(method, args),
            Self::Math => call_math(method, args),
            Self::Shellwords => call_shellwords(method, args),
        }
    }
}

fn undefined(module: Module, method: &str) -> EvalError {
    EvalError::UndefinedMethod {
        method: method.to_string(),
        receiver: module.name(),
    }
}

/// `value.to_json`, available once `json` is required
pub(super) fn to_json(value: &Value) -> EvalResult<Value> {
    Ok(Value::Str(serde_json::to_string(value)?))
}

fn call_json(method: &str, args: &[Value]) -> EvalResult<Value> {
    match method {
        "parse" => {
            expect_arity(method, args, 1, 1)?;
            let text = expect_str(method, &args[0])?;
            let json: serde_json::Value = serde_json::from_str(text)?;
            Ok(Value::from_json(json))
        }
        "generate" | "dump" => {
            expect_arity(method, args, 1, 1)?;
            to_json(&args[0])
        }
        "pretty_generate" => {
            expect_arity(method, args, 1, 1)?;
            Ok(Value::Str(serde_json::to_string_pretty(&args[0])?))
        }
        _ => Err(undefined(Module::Json, method)),
    }
}

fn number_arg(method: &str, value: &Value) -> EvalResult<f64> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(EvalError::type_error(format!(
            "Math.{method}: can't convert {} into Float",
            other.type_name()
        ))),
    }
}

fn call_math(method: &str, args: &[Value]) -> EvalResult<Value> {
    let unary = |f: fn(f64) -> f64| -> EvalResult<Value> {
        expect_arity(method, args, 1, 1)?;
        Ok(Value::Float(f(number_arg(method, &args[0])?)))
    };

    match method {
        "pi" | "PI" => Ok(Value::Float(std::f64::consts::PI)),
        "e" | "E" => Ok(Value::Float(std::f64::consts::E)),
        "sqrt" => unary(f64::sqrt),
        "cbrt" => unary(f64::cbrt),
        "log" => unary(f64::ln),
        "log2" => unary(f64::log2),
        "log10" => unary(f64::log10),
        "exp" => unary(f64::exp),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "pow" => {
            expect_arity(method, args, 2, 2)?;
            let base = number_arg(method, &args[0])?;
            let exponent = number_arg(method, &args[1])?;
            Ok(Value::Float(base.powf(exponent)))
        }
        "hypot" => {
            expect_arity(method, args, 2, 2)?;
            let a = number_arg(method, &args[0])?;
            let b = number_arg(method, &args[1])?;
            Ok(Value::Float(a.hypot(b)))
        }
        _ => Err(undefined(Module::Math, method)),
    }
}

fn call_shellwords(method: &str, args: &[Value]) -> EvalResult<Value> {
    match method {
        "split" | "shellsplit" => {
            expect_arity(method, args, 1, 1)?;
            let text = expect_str(method, &args[0])?;
            let words = shlex::split(text).ok_or_else(|| {
                EvalError::type_error(format!("unmatched quote in {}", Value::Str(text.to_string()).inspect()))
            })?;
            Ok(Value::List(words.into_iter().map(Value::Str).collect()))
        }
        "escape" => {
            expect_arity(method, args, 1, 1)?;
            let text = expect_str(method, &args[0])?;
            Ok(Value::Str(quote(text)?))
        }
        "join" => {
            expect_arity(method, args, 1, 1)?;
            let Value::List(items) = &args[0] else {
                return Err(EvalError::type_error("Shellwords.join expects an Array"));
            };
            let quoted = items
                .iter()
                .map(|item| quote(&item.to_s()))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Str(quoted.join(" ")))
        }
        _ => Err(undefined(Module::Shellwords, method)),
    }
}

fn quote(text: &str) -> EvalResult<String> {
    shlex::try_quote(text)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| EvalError::type_error(format!("cannot escape {text:?}: {e}")))
}
