//! Helper functions for operator evaluation

use std::cmp::Ordering;

use super::EvalResult;
use super::value::Value;
use crate::ast::BinaryOp;
use crate::error::EvalError;

pub(super) fn negate(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(EvalError::UndefinedMethod {
            method: "-@".to_string(),
            receiver: other.type_name(),
        }),
    }
}

fn overflow() -> EvalError {
    EvalError::type_error("integer overflow")
}

/// Apply a non short-circuiting binary operator
pub(super) fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.equals(right))),
        BinaryOp::NotEq => Ok(Value::Bool(!left.equals(right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(left, right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        // `&&` and `||` never reach here with both sides evaluated
        BinaryOp::And => Ok(if left.is_truthy() { right.clone() } else { left.clone() }),
        BinaryOp::Or => Ok(if left.is_truthy() { left.clone() } else { right.clone() }),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right)
        }
    }
}

/// Ordering of two values, or a type error naming both sides
pub(super) fn compare(left: &Value, right: &Value) -> EvalResult<Ordering> {
    left.compare(right).ok_or_else(|| {
        EvalError::type_error(format!(
            "comparison of {} with {} failed",
            left.type_name(),
            right.type_name()
        ))
    })
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, *a, *b),
        #[allow(clippy::cast_precision_loss)]
        (Value::Int(a), Value::Float(b)) => Ok(float_arithmetic(op, *a as f64, *b)),
        #[allow(clippy::cast_precision_loss)]
        (Value::Float(a), Value::Int(b)) => Ok(float_arithmetic(op, *a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(float_arithmetic(op, *a, *b)),

        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => Ok(Value::Str(format!("{a}{b}"))),
        (Value::Str(s), Value::Int(n)) if op == BinaryOp::Mul => {
            let count = usize::try_from(*n)
                .map_err(|_| EvalError::type_error("negative argument to String#*"))?;
            Ok(Value::Str(s.repeat(count)))
        }
        (Value::Str(_), other) if op == BinaryOp::Add => Err(EvalError::type_error(format!(
            "no implicit conversion of {} into String",
            other.type_name()
        ))),

        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (Value::List(a), Value::List(b)) if op == BinaryOp::Sub => Ok(Value::List(
            a.iter()
                .filter(|item| !b.iter().any(|other| other.equals(item)))
                .cloned()
                .collect(),
        )),

        (Value::Int(_) | Value::Float(_), other) => Err(EvalError::type_error(format!(
            "{} can't be coerced into {}",
            other.type_name(),
            left.type_name()
        ))),
        _ => Err(EvalError::UndefinedMethod {
            method: op.symbol().to_string(),
            receiver: left.type_name(),
        }),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> EvalResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvalError::ZeroDivision);
            }
            a.checked_div(b).map(|q| if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q })
        }
        _ => {
            if b == 0 {
                return Err(EvalError::ZeroDivision);
            }
            // the result takes the sign of the divisor; i64::MIN % -1 is 0
            let r = a.wrapping_rem(b);
            Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
    };
    result.map(Value::Int).ok_or_else(overflow)
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Value {
    Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => {
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn int(op: BinaryOp, a: i64, b: i64) -> Value {
        apply_binary(op, &Value::Int(a), &Value::Int(b)).unwrap()
    }

    #[test]
    fn test_integer_division_floors() {
        assert!(int(BinaryOp::Div, 7, 2).equals(&Value::Int(3)));
        assert!(int(BinaryOp::Div, -7, 2).equals(&Value::Int(-4)));
        assert!(int(BinaryOp::Rem, -7, 2).equals(&Value::Int(1)));
        assert!(int(BinaryOp::Rem, 7, -2).equals(&Value::Int(-1)));
    }

    #[test]
    fn test_division_by_zero() {
        let err = apply_binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.to_string(), "divided by 0");
        let inf = apply_binary(BinaryOp::Div, &Value::Float(1.0), &Value::Int(0)).unwrap();
        assert_eq!(inf.to_s(), "Infinity");
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(apply_binary(BinaryOp::Mul, &Value::Int(i64::MAX), &Value::Int(2)).is_err());
        assert!(negate(&Value::Int(i64::MIN)).is_err());
        assert!(apply_binary(BinaryOp::Div, &Value::Int(i64::MIN), &Value::Int(-1)).is_err());
    }

    #[test]
    fn test_min_modulo_minus_one_is_zero() {
        assert!(int(BinaryOp::Rem, i64::MIN, -1).equals(&Value::Int(0)));
        assert!(int(BinaryOp::Rem, i64::MIN, 3).equals(&Value::Int(1)));
    }

    #[test]
    fn test_mixed_numbers_promote() {
        let v = apply_binary(BinaryOp::Add, &Value::Int(1), &Value::Float(0.5)).unwrap();
        assert_eq!(v.to_s(), "1.5");
    }

    #[test]
    fn test_strings_and_lists() {
        let s = apply_binary(BinaryOp::Add, &Value::Str("a".into()), &Value::Str("b".into())).unwrap();
        assert_eq!(s.to_s(), "ab");
        let s = apply_binary(BinaryOp::Mul, &Value::Str("ab".into()), &Value::Int(3)).unwrap();
        assert_eq!(s.to_s(), "ababab");
        let err = apply_binary(BinaryOp::Add, &Value::Str("a".into()), &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "no implicit conversion of Integer into String");

        let list = |xs: &[i64]| Value::List(xs.iter().copied().map(Value::Int).collect());
        let diff = apply_binary(BinaryOp::Sub, &list(&[1, 2, 3, 2]), &list(&[2])).unwrap();
        assert_eq!(diff.inspect(), "[1, 3]");
    }

    #[test]
    fn test_comparison() {
        assert!(int(BinaryOp::Le, 2, 2).is_truthy());
        assert!(!int(BinaryOp::Gt, 1, 2).is_truthy());
        let err = apply_binary(BinaryOp::Lt, &Value::Str("a".into()), &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "comparison of String with Integer failed");
    }
}
