//! Interpreter to execute the AST
//!
//! A tree-walking evaluator for rexe's expression language. Functions and
//! constants defined by the startup file, `-l` files and script libraries are
//! global; local variables live in a [`Frame`] that belongs to one invocation.

mod execution;
mod library;
mod methods;
mod value;

pub use library::Module;
pub use value::Value;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use regex::Regex;
use tracing::debug;

use crate::ast::{BinaryOp, Block, Expression, Program, Statement, StringPart, UnaryOp};
use crate::error::EvalError;
use crate::evaluator::{Context, ScriptEvaluator};
use crate::parser;

pub(crate) type EvalResult<T> = Result<T, EvalError>;

/// Deepest nesting of user function and block calls before giving up.
const MAX_CALL_DEPTH: usize = 512;

/// Native stack for the thread that runs user code; fits `MAX_CALL_DEPTH`
/// nested calls with room to spare.
pub const EVAL_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Origin shown in syntax errors for code given on the command line.
const COMMAND_LINE_ORIGIN: &str = "-e";

struct Function {
    params: Vec<String>,
    body: Expression,
}

/// Variables and `self` for one running unit, function or block
#[derive(Clone, Default)]
struct Frame {
    receiver: Option<Value>,
    locals: HashMap<String, Value>,
}

impl Frame {
    fn with_receiver(receiver: Option<Value>) -> Self {
        Self {
            receiver,
            locals: HashMap::new(),
        }
    }
}

/// A block literal together with the frame it closes over
pub(crate) struct BlockRef<'a> {
    block: &'a Block,
    frame: &'a Frame,
}

/// User code compiled by [`Interpreter::compile`]
#[derive(Debug, Clone)]
pub struct Unit {
    program: Program,
}

pub struct Interpreter {
    functions: HashMap<String, Rc<Function>>,
    constants: HashMap<String, Value>,
    required: HashSet<String>,
    search_path: Vec<PathBuf>,
    regex_cache: HashMap<String, Regex>,
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
            constants: HashMap::new(),
            required: HashSet::new(),
            search_path: Vec::new(),
            regex_cache: HashMap::new(),
            depth: 0,
        }
    }

    /// Directories searched for `NAME.rexe` when a library is not built in
    #[must_use]
    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Whether `name` has been required
    #[must_use]
    pub fn has_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }

    /// Compile a pattern, reusing earlier compilations
    pub(crate) fn regex(&mut self, pattern: &str) -> EvalResult<Regex> {
        if let Some(re) = self.regex_cache.get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern)?;
        self.regex_cache.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    fn execute(&mut self, program: &Program, frame: &mut Frame) -> EvalResult<Value> {
        self.eval_statements(&program.statements, frame)
    }

    fn eval_statements(&mut self, statements: &[Statement], frame: &mut Frame) -> EvalResult<Value> {
        let mut last = Value::Nil;
        for statement in statements {
            last = self.eval_statement(statement, frame)?;
        }
        Ok(last)
    }

    fn eval_statement(&mut self, statement: &Statement, frame: &mut Frame) -> EvalResult<Value> {
        match statement {
            Statement::FunctionDef { name, params, body } => {
                self.functions.insert(
                    name.clone(),
                    Rc::new(Function {
                        params: params.clone(),
                        body: body.clone(),
                    }),
                );
                Ok(Value::Nil)
            }
            Statement::Assignment { name, value } => {
                let value = self.eval(value, frame)?;
                frame.locals.insert(name.clone(), value.clone());
                Ok(value)
            }
            Statement::ConstantDef { name, value } => {
                let value = self.eval(value, frame)?;
                self.constants.insert(name.clone(), value.clone());
                Ok(value)
            }
            Statement::Expression(expr) => self.eval(expr, frame),
        }
    }

    fn eval(&mut self, expr: &Expression, frame: &mut Frame) -> EvalResult<Value> {
        match expr {
            Expression::Nil => Ok(Value::Nil),
            Expression::Bool(b) => Ok(Value::Bool(*b)),
            Expression::Integer(i) => Ok(Value::Int(*i)),
            Expression::Float(f) => Ok(Value::Float(*f)),
            Expression::String(s) => Ok(Value::Str(s.clone())),
            Expression::Interpolated(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        StringPart::Literal(text) => out.push_str(text),
                        StringPart::Code(code) => out.push_str(&self.eval(code, frame)?.to_s()),
                    }
                }
                Ok(Value::Str(out))
            }
            Expression::List(items) => items
                .iter()
                .map(|item| self.eval(item, frame))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::List),
            Expression::SelfRef => Ok(frame.receiver.clone().unwrap_or(Value::Nil)),
            Expression::Identifier(name) => self.eval_identifier(name, frame),
            Expression::Constant(name) => self
                .constants
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedConstant(name.clone())),
            Expression::Call {
                receiver,
                method,
                args,
                block,
            } => {
                let receiver = match receiver {
                    Some(expr) => Some(self.eval(expr, frame)?),
                    None => None,
                };
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, frame))
                    .collect::<EvalResult<Vec<_>>>()?;
                let block = block.as_ref().map(|block| BlockRef { block, frame: &*frame });
                match receiver {
                    Some(receiver) => self.send(receiver, method, &args, block.as_ref()),
                    None => self.call_without_receiver(method, args, block.as_ref(), frame),
                }
            }
            Expression::Index { target, index } => {
                let target = self.eval(target, frame)?;
                let index = self.eval(index, frame)?;
                self.send(target, "[]", &[index], None)
            }
            Expression::Unary { op, operand } => {
                let value = self.eval(operand, frame)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => execution::negate(&value),
                }
            }
            Expression::Binary { op, left, right } => {
                let left = self.eval(left, frame)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => Ok(left),
                    BinaryOp::Or if left.is_truthy() => Ok(left),
                    BinaryOp::And | BinaryOp::Or => self.eval(right, frame),
                    _ => {
                        let right = self.eval(right, frame)?;
                        execution::apply_binary(*op, &left, &right)
                    }
                }
            }
            Expression::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.eval(condition, frame)?.is_truthy() {
                        return self.eval_statements(body, frame);
                    }
                }
                match otherwise {
                    Some(body) => self.eval_statements(body, frame),
                    None => Ok(Value::Nil),
                }
            }
        }
    }

    /// A bare name: local variable, then user function, then a method on `self`
    fn eval_identifier(&mut self, name: &str, frame: &Frame) -> EvalResult<Value> {
        if let Some(value) = frame.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(function) = self.functions.get(name).cloned() {
            return self.call_function(name, &function, frame.receiver.clone(), Vec::new());
        }
        let Some(receiver) = frame.receiver.clone() else {
            return Err(EvalError::UndefinedName(name.to_string()));
        };
        self.send(receiver, name, &[], None).map_err(|e| match e {
            EvalError::UndefinedMethod { method, .. } if method == name => {
                EvalError::UndefinedName(name.to_string())
            }
            other => other,
        })
    }

    fn call_without_receiver(
        &mut self,
        method: &str,
        args: Vec<Value>,
        block: Option<&BlockRef<'_>>,
        frame: &Frame,
    ) -> EvalResult<Value> {
        if let Some(function) = self.functions.get(method).cloned() {
            return self.call_function(method, &function, frame.receiver.clone(), args);
        }
        if method == "require" {
            expect_arity(method, &args, 1, 1)?;
            let name = expect_str(method, &args[0])?.to_string();
            let newly_loaded = !self.has_required(&name);
            self.require(&name)?;
            return Ok(Value::Bool(newly_loaded));
        }
        match frame.receiver.clone() {
            Some(receiver) => self.send(receiver, method, &args, block),
            None => Err(EvalError::UndefinedMethod {
                method: method.to_string(),
                receiver: "main",
            }),
        }
    }

    /// Call `method` on `receiver`: built-in methods first, then user
    /// functions with `receiver` bound as `self`.
    fn send(
        &mut self,
        receiver: Value,
        method: &str,
        args: &[Value],
        block: Option<&BlockRef<'_>>,
    ) -> EvalResult<Value> {
        if let Value::Module(module) = receiver {
            return module.call(method, args);
        }
        let result = methods::call(self, &receiver, method, args, block);
        if let Err(EvalError::UndefinedMethod { method: missing, .. }) = &result
            && missing == method
            && let Some(function) = self.functions.get(method).cloned()
        {
            return self.call_function(method, &function, Some(receiver), args.to_vec());
        }
        result
    }

    fn call_function(
        &mut self,
        name: &str,
        function: &Function,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        if args.len() != function.params.len() {
            return Err(EvalError::Arity {
                name: name.to_string(),
                given: args.len(),
                expected: function.params.len().to_string(),
            });
        }
        let mut frame = Frame::with_receiver(receiver);
        for (param, arg) in function.params.iter().zip(args) {
            frame.locals.insert(param.clone(), arg);
        }

        self.nested(|interp| interp.eval(&function.body, &mut frame))
    }

    /// Run `f` one call level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> EvalResult<T>) -> EvalResult<T> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::StackOverflow);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Run a block with `args` bound to its parameters.
    ///
    /// A single list argument is spread over several parameters, so
    /// `{ |k, v| ... }` works on `[key, value]` pairs.
    pub(crate) fn call_block(&mut self, block: &BlockRef<'_>, args: Vec<Value>) -> EvalResult<Value> {
        let mut frame = block.frame.clone();
        let params = &block.block.params;

        let mut args = args;
        if params.len() > 1
            && let [Value::List(items)] = args.as_mut_slice()
        {
            args = std::mem::take(items);
        }
        let mut args = args.into_iter();
        for param in params {
            frame.locals.insert(param.clone(), args.next().unwrap_or(Value::Nil));
        }

        self.nested(|interp| interp.eval_statements(&block.block.body, &mut frame))
    }

    fn load_library_file(&mut self, name: &str) -> EvalResult<()> {
        let path = library::find_file(name, &self.search_path)
            .ok_or_else(|| EvalError::LoadError(name.to_string()))?;
        let origin = path.display().to_string();
        debug!("Reading library {origin}");
        let source = fs::read_to_string(&path).map_err(|source| EvalError::ReadFile {
            path: origin.clone(),
            source,
        })?;
        self.run_source(&source, &origin)
    }
}

impl ScriptEvaluator for Interpreter {
    type Unit = Unit;
    type Output = Value;

    fn require(&mut self, name: &str) -> EvalResult<()> {
        if !self.required.insert(name.to_string()) {
            return Ok(());
        }
        if let Some(module) = library::builtin(name) {
            self.constants
                .insert(module.name().to_string(), Value::Module(module));
            return Ok(());
        }
        let loaded = self.load_library_file(name);
        if loaded.is_err() {
            self.required.remove(name);
        }
        loaded
    }

    fn run_source(&mut self, source: &str, origin: &str) -> EvalResult<()> {
        let program = parser::parse_program(source, Some(origin))?;
        self.execute(&program, &mut Frame::default())?;
        Ok(())
    }

    fn compile(&mut self, source: &str) -> EvalResult<Unit> {
        let program = parser::parse_program(source, Some(COMMAND_LINE_ORIGIN))?;
        Ok(Unit { program })
    }

    fn invoke(&mut self, unit: &Unit, context: Context) -> EvalResult<Value> {
        let receiver = match context {
            Context::Line(line) => Some(Value::Str(line)),
            Context::Text(text) => Some(Value::Str(text)),
            Context::Lines(stream) => Some(Value::Lines(Rc::new(RefCell::new(stream)))),
            Context::None => None,
        };
        self.execute(&unit.program, &mut Frame::with_receiver(receiver))
    }
}

pub(crate) fn expect_arity(method: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min}..{max}")
        };
        return Err(EvalError::Arity {
            name: method.to_string(),
            given: args.len(),
            expected,
        });
    }
    Ok(())
}

pub(crate) fn expect_str<'v>(method: &str, value: &'v Value) -> EvalResult<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(EvalError::type_error(format!(
            "{method}: no implicit conversion of {} into String",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_int(method: &str, value: &Value) -> EvalResult<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(EvalError::type_error(format!(
            "{method}: no implicit conversion of {} into Integer",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::evaluator::LineStream;
    use std::io::Cursor;

    fn run(code: &str, context: Context) -> EvalResult<Value> {
        let mut interp = Interpreter::new();
        let unit = interp.compile(code)?;
        interp.invoke(&unit, context)
    }

    fn run_line(code: &str, line: &str) -> String {
        run(code, Context::Line(line.to_string())).unwrap().to_s()
    }

    #[test]
    fn test_self_is_the_line() {
        assert_eq!(run_line("self", "abc"), "abc");
        assert_eq!(run_line("upcase", "abc"), "ABC");
        assert_eq!(run_line("reverse.upcase", "abc"), "CBA");
    }

    #[test]
    fn test_whole_string_length_counts_newlines() {
        let value = run("length", Context::Text("x\ny\n".to_string())).unwrap();
        assert!(value.equals(&Value::Int(4)));
    }

    #[test]
    fn test_line_stream_to_a_size() {
        let stream = LineStream::new(Cursor::new("a\nb\nc\n"));
        let value = run("to_a.size", Context::Lines(stream)).unwrap();
        assert!(value.equals(&Value::Int(3)));
    }

    #[test]
    fn test_line_stream_is_lazy_and_consumed_once() {
        let stream = LineStream::new(Cursor::new("a\nb\nc\n"));
        let value = run("first; to_a", Context::Lines(stream)).unwrap();
        assert_eq!(value.inspect(), r#"["b\n", "c\n"]"#);
    }

    #[test]
    fn test_no_receiver() {
        assert!(run("6 * 7", Context::None).unwrap().equals(&Value::Int(42)));
        assert!(run("self", Context::None).unwrap().equals(&Value::Nil));
        let err = run("length", Context::None).unwrap_err();
        assert!(matches!(err, EvalError::UndefinedName(ref n) if n == "length"));
    }

    #[test]
    fn test_unknown_bare_name_on_line() {
        let err = run("frobnicate", Context::Line("x".into())).unwrap_err();
        assert_eq!(err.to_string(), "undefined local variable or method 'frobnicate'");
    }

    #[test]
    fn test_constant_requires_library() {
        let mut interp = Interpreter::new();
        let unit = interp.compile("JSON.name").unwrap();
        let err = interp.invoke(&unit, Context::None).unwrap_err();
        assert_eq!(err.to_string(), "uninitialized constant JSON");

        interp.require("json").unwrap();
        let value = interp.invoke(&unit, Context::None).unwrap();
        assert_eq!(value.to_s(), "JSON");
    }

    #[test]
    fn test_to_json_needs_json() {
        let err = run("[1, 'a'].to_json", Context::None).unwrap_err();
        assert!(matches!(err, EvalError::UndefinedMethod { .. }));

        let mut interp = Interpreter::new();
        interp.require("json").unwrap();
        let unit = interp.compile("[1, 'a', nil].to_json").unwrap();
        assert_eq!(interp.invoke(&unit, Context::None).unwrap().to_s(), r#"[1,"a",null]"#);
    }

    #[test]
    fn test_unknown_library() {
        let mut interp = Interpreter::new();
        let err = interp.require("no_such_lib").unwrap_err();
        assert_eq!(err.to_string(), "cannot load such file -- no_such_lib");
        assert!(!interp.has_required("no_such_lib"));
    }

    #[test]
    fn test_library_file_on_search_path() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("shout.rexe"), "def shout = upcase + '!'").unwrap();

        let mut interp = Interpreter::new().with_search_path(vec![dir.path().to_path_buf()]);
        interp.require("shout").unwrap();
        let unit = interp.compile("shout").unwrap();
        assert_eq!(interp.invoke(&unit, Context::Line("hi".into())).unwrap().to_s(), "HI!");
    }

    #[test]
    fn test_definitions_survive_across_units() {
        let mut interp = Interpreter::new();
        interp
            .run_source("def double(n) = n * 2\nLimit = 10\nscratch = 1", "rc")
            .unwrap();
        let unit = interp.compile("double(Limit)").unwrap();
        assert!(interp.invoke(&unit, Context::None).unwrap().equals(&Value::Int(20)));

        // locals do not leak out of the file that set them
        let unit = interp.compile("scratch").unwrap();
        assert!(interp.invoke(&unit, Context::None).is_err());
    }

    #[test]
    fn test_user_function_sees_caller_self() {
        let mut interp = Interpreter::new();
        interp.run_source("def loud = upcase", "rc").unwrap();
        let unit = interp.compile("loud + '/' + 'x'.loud").unwrap();
        let value = interp.invoke(&unit, Context::Line("ab".into())).unwrap();
        assert_eq!(value.to_s(), "AB/X");
    }

    #[test]
    fn test_require_from_source() {
        let mut interp = Interpreter::new();
        interp.run_source("require('math')", "rc").unwrap();
        assert!(interp.has_required("math"));
    }

    #[test]
    fn test_arity_error() {
        let mut interp = Interpreter::new();
        interp.run_source("def pair(a, b) = [a, b]", "rc").unwrap();
        let unit = interp.compile("pair(1)").unwrap();
        let err = interp.invoke(&unit, Context::None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "wrong number of arguments for 'pair' (given 1, expected 2)"
        );
    }

    /// Run `source` with no input on a thread sized like the CLI's.
    fn run_deep(defs: &'static str, source: &'static str) -> EvalResult<String> {
        std::thread::Builder::new()
            .stack_size(EVAL_STACK_SIZE)
            .spawn(move || {
                let mut interp = Interpreter::new();
                interp.run_source(defs, "rc")?;
                let unit = interp.compile(source)?;
                interp.invoke(&unit, Context::None).map(|value| value.to_s())
            })
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_runaway_recursion_is_an_error() {
        let result = run_deep("def forever(n) = forever(n + 1)", "forever(0)");
        assert!(matches!(result, Err(EvalError::StackOverflow)));
    }

    #[test]
    fn test_recursion_through_blocks_is_bounded() {
        let defs = "def f(n) = if n > 0 then [n].map { |x| [x].map { |y| [y].map { |z| f(n - 1) } } } else 0 end";
        assert!(matches!(run_deep(defs, "f(250)"), Err(EvalError::StackOverflow)));
        assert_eq!(run_deep(defs, "f(2).flatten").unwrap(), "[0]");
    }

    #[test]
    fn test_deep_but_bounded_recursion() {
        let result = run_deep("def down(n) = if n == 0 then 0 else down(n - 1) end", "down(500)");
        assert_eq!(result.unwrap(), "0");
    }

    #[test]
    fn test_recursion_with_if() {
        let mut interp = Interpreter::new();
        interp
            .run_source("def fact(n) = if n <= 1 then 1 else n * fact(n - 1) end", "rc")
            .unwrap();
        let unit = interp.compile("fact(10)").unwrap();
        assert!(interp.invoke(&unit, Context::None).unwrap().equals(&Value::Int(3_628_800)));
    }

    #[test]
    fn test_short_circuit_returns_operand() {
        assert_eq!(run("nil || 'fallback'", Context::None).unwrap().to_s(), "fallback");
        assert!(run("false && undefined_thing", Context::None).unwrap().equals(&Value::Bool(false)));
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(run_line(r##""#{size}: #{upcase}""##, "ab"), "2: AB");
    }

    #[test]
    fn test_blocks_close_over_locals() {
        let value = run("n = 10; [1, 2].map { |x| x + n }", Context::None).unwrap();
        assert_eq!(value.inspect(), "[11, 12]");
    }

    #[test]
    fn test_syntax_error_names_command_line() {
        let mut interp = Interpreter::new();
        let err = interp.compile("upcase(").unwrap_err();
        assert!(err.to_string().contains("-e:1:"), "{err}");
    }
}
