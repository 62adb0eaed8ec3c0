//! Runtime values of the embedded language.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::ser::{Error as _, Serialize, SerializeMap, SerializeSeq, Serializer};

use super::library::Module;
use crate::evaluator::LineStream;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A library namespace such as `JSON`
    Module(Module),
    /// Input lines, read on demand
    Lines(Rc<RefCell<LineStream>>),
}

impl Value {
    /// Only `nil` and `false` are false
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "NilClass",
            Self::Bool(true) => "TrueClass",
            Self::Bool(false) => "FalseClass",
            Self::Int(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Str(_) => "String",
            Self::List(_) => "Array",
            Self::Map(_) => "Hash",
            Self::Module(_) => "Module",
            Self::Lines(_) => "Enumerator",
        }
    }

    /// Conversion used by string interpolation, `to_s` and `join`
    #[must_use]
    pub fn to_s(&self) -> String {
        match self {
            Self::Nil => String::new(),
            Self::Str(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Module(m) => m.name().to_string(),
            Self::List(_) | Self::Map(_) | Self::Lines(_) => self.inspect(),
        }
    }

    /// Developer-facing representation: strings quoted, `nil` spelled out
    #[must_use]
    pub fn inspect(&self) -> String {
        match self {
            Self::Nil => "nil".to_string(),
            Self::Str(s) => format!("{s:?}"),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::inspect).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Map(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k:?} => {}", v.inspect()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Self::Lines(_) => "#<Enumerator: lines>".to_string(),
            _ => self.to_s(),
        }
    }

    /// Equality across types the way the language sees it (`1 == 1.0`)
    #[must_use]
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            #[allow(clippy::float_cmp)]
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            (Self::Module(a), Self::Module(b)) => a == b,
            (Self::Lines(a), Self::Lines(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering for `<`, `sort`, `min`, ...; `None` when the values are not comparable
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => {}
                        unequal => return Some(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Build a value from parsed JSON
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

/// The printed form of a result: lists put one element per line, everything
/// else prints its `to_s`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(items) => {
                for item in items {
                    let rendered = item.to_string();
                    f.write_str(&rendered)?;
                    if !rendered.ends_with('\n') {
                        f.write_str("\n")?;
                    }
                }
                Ok(())
            }
            _ => f.write_str(&self.to_s()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Nil => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Module(m) => serializer.serialize_str(m.name()),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Self::Lines(_) => Err(S::Error::custom(
                "a line stream cannot be converted to JSON; call to_a first",
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::Str((*s).to_string())).collect())
    }

    #[test]
    fn test_to_s_and_inspect() {
        assert_eq!(Value::Nil.to_s(), "");
        assert_eq!(Value::Nil.inspect(), "nil");
        assert_eq!(Value::Float(3.0).to_s(), "3.0");
        assert_eq!(Value::Float(0.25).to_s(), "0.25");
        assert_eq!(Value::Str("a\n".to_string()).inspect(), "\"a\\n\"");
        assert_eq!(list(&["a", "b"]).to_s(), "[\"a\", \"b\"]");
    }

    #[test]
    fn test_display_puts_lists_one_per_line() {
        assert_eq!(list(&["a", "b"]).to_string(), "a\nb\n");
        assert_eq!(list(&["a\n", "b\n"]).to_string(), "a\nb\n");
        assert_eq!(Value::List(vec![]).to_string(), "");
        assert_eq!(Value::Int(3).to_string(), "3");
    }

    #[test]
    fn test_numeric_equality_and_ordering() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)));
        assert!(!Value::Int(1).equals(&Value::Str("1".to_string())));
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Str("a".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_json_conversion() {
        let json: serde_json::Value = serde_json::from_str(r#"{"a": [1, 2.5, null], "b": "x"}"#).unwrap();
        let value = Value::from_json(json);
        assert_eq!(value.inspect(), r#"{"a" => [1, 2.5, nil], "b" => "x"}"#);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":[1,2.5,null],"b":"x"}"#);
    }
}
