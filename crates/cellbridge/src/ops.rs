//! Arithmetic, comparison and membership on builtin values.

use std::cmp::Ordering;

use crate::{
    exception::{ExcType, RunResult},
    expressions::{CmpOperator, Operator},
    value::Value,
};

/// Evaluates `left <op> right` for every operator except the short-circuiting `and`/`or`.
pub(crate) fn binary_op(left: &Value, op: Operator, right: &Value) -> RunResult<Value> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        if let (Value::Bool(x), Value::Bool(y)) = (left, right) {
            match op {
                Operator::BitAnd => return Ok(Value::Bool(*x & *y)),
                Operator::BitOr => return Ok(Value::Bool(*x | *y)),
                Operator::BitXor => return Ok(Value::Bool(*x ^ *y)),
                _ => {}
            }
        }
        return int_op(a, op, b);
    }
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return float_op(a, op, b).ok_or_else(|| unsupported(op, left, right))?;
    }
    match (left, op, right) {
        (Value::Str(a), Operator::Add, Value::Str(b)) => Ok(Value::from(format!("{a}{b}"))),
        (Value::List(a), Operator::Add, Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::new_list(items))
        }
        (Value::Tuple(a), Operator::Add, Value::Tuple(b)) => {
            Ok(Value::new_tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (sequence, Operator::Mult, count) | (count, Operator::Mult, sequence)
            if count.as_int().is_some() && matches!(sequence, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
        {
            repeat(sequence, count.as_int().unwrap_or_default())
        }
        _ => Err(unsupported(op, left, right)),
    }
}

fn unsupported(op: Operator, left: &Value, right: &Value) -> crate::exception::Exception {
    ExcType::type_error_unsupported_operand(op.symbol(), &left.type_name(), &right.type_name())
}

fn int_op(a: i64, op: Operator, b: i64) -> RunResult<Value> {
    let result = match op {
        Operator::Add => a.checked_add(b),
        Operator::Sub => a.checked_sub(b),
        Operator::Mult => a.checked_mul(b),
        Operator::Div => {
            if b == 0 {
                return Err(ExcType::zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        Operator::FloorDiv => {
            if b == 0 {
                return Err(ExcType::zero_division("integer division or modulo by zero"));
            }
            a.checked_div(b).map(|q| if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q })
        }
        Operator::Mod => {
            if b == 0 {
                return Err(ExcType::zero_division("integer modulo by zero"));
            }
            a.checked_rem(b).map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        Operator::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp))
        }
        Operator::LShift => {
            if b < 0 {
                return Err(ExcType::value_error("negative shift count"));
            }
            if a == 0 {
                Some(0)
            } else if b >= 64 {
                None
            } else {
                let shifted = a << b;
                (shifted >> b == a).then_some(shifted)
            }
        }
        Operator::RShift => {
            if b < 0 {
                return Err(ExcType::value_error("negative shift count"));
            }
            Some(if b >= 64 { if a < 0 { -1 } else { 0 } } else { a >> b })
        }
        Operator::BitOr => Some(a | b),
        Operator::BitXor => Some(a ^ b),
        Operator::BitAnd => Some(a & b),
        Operator::And | Operator::Or => return Err(ExcType::type_error("boolean operators are not binary operations")),
    };
    result.map(Value::Int).ok_or_else(ExcType::overflow)
}

/// Float arithmetic; `None` for operators floats do not support.
fn float_op(a: f64, op: Operator, b: f64) -> Option<RunResult<Value>> {
    let value = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mult => a * b,
        Operator::Div => {
            if b == 0.0 {
                return Some(Err(ExcType::zero_division("float division by zero")));
            }
            a / b
        }
        Operator::FloorDiv => {
            if b == 0.0 {
                return Some(Err(ExcType::zero_division("float floor division by zero")));
            }
            (a / b).floor()
        }
        Operator::Mod => {
            if b == 0.0 {
                return Some(Err(ExcType::zero_division("float modulo by zero")));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
        Operator::Pow => {
            if a == 0.0 && b < 0.0 {
                return Some(Err(ExcType::zero_division("0.0 cannot be raised to a negative power")));
            }
            a.powf(b)
        }
        _ => return None,
    };
    Some(Ok(Value::Float(value)))
}

/// Largest sequence, in items (bytes for `str`), that repetition will build.
const MAX_REPEAT_LEN: usize = 1 << 28;

fn repeat(sequence: &Value, count: i64) -> RunResult<Value> {
    let count = usize::try_from(count).unwrap_or(0);
    match sequence {
        Value::Str(s) => {
            check_repeat_len(s.len(), count)?;
            Ok(Value::from(s.repeat(count)))
        }
        Value::List(items) => {
            let items = items.borrow();
            Ok(Value::new_list(repeat_items(&items, count)?))
        }
        Value::Tuple(items) => Ok(Value::new_tuple(repeat_items(items, count)?)),
        other => Err(ExcType::type_error(format!(
            "can't multiply sequence by non-int of type '{}'",
            other.type_name()
        ))),
    }
}

fn check_repeat_len(len: usize, count: usize) -> RunResult<usize> {
    match len.checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(total),
        _ => Err(ExcType::memory_error()),
    }
}

fn repeat_items(items: &[Value], count: usize) -> RunResult<Vec<Value>> {
    let mut out = Vec::with_capacity(check_repeat_len(items.len(), count)?);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    Ok(out)
}

pub(crate) fn negate(value: &Value) -> RunResult<Value> {
    match value {
        Value::Float(f) => Ok(Value::Float(-f)),
        other => match other.as_int() {
            Some(i) => i.checked_neg().map(Value::Int).ok_or_else(ExcType::overflow),
            None => Err(bad_operand("unary -", other)),
        },
    }
}

pub(crate) fn positive(value: &Value) -> RunResult<Value> {
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        other => other.as_int().map(Value::Int).ok_or_else(|| bad_operand("unary +", other)),
    }
}

pub(crate) fn invert(value: &Value) -> RunResult<Value> {
    value
        .as_int()
        .map(|i| Value::Int(!i))
        .ok_or_else(|| bad_operand("unary ~", value))
}

fn bad_operand(op: &str, value: &Value) -> crate::exception::Exception {
    ExcType::type_error(format!("bad operand type for {op}: '{}'", value.type_name()))
}

/// Evaluates one link of a comparison chain. Membership on the session context is handled
/// by the interpreter, which owns the host connection.
pub(crate) fn compare(left: &Value, op: CmpOperator, right: &Value) -> RunResult<bool> {
    match op {
        CmpOperator::Eq => Ok(left.py_eq(right)),
        CmpOperator::NotEq => Ok(!left.py_eq(right)),
        CmpOperator::Is => Ok(left.is(right)),
        CmpOperator::IsNot => Ok(!left.is(right)),
        CmpOperator::In => contains(right, left),
        CmpOperator::NotIn => contains(right, left).map(|found| !found),
        CmpOperator::Lt | CmpOperator::LtE | CmpOperator::Gt | CmpOperator::GtE => {
            let ordering = left.py_cmp(right).ok_or_else(|| {
                ExcType::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            Ok(match op {
                CmpOperator::Lt => ordering == Ordering::Less,
                CmpOperator::LtE => ordering != Ordering::Greater,
                CmpOperator::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// `item in container` for builtin containers.
pub(crate) fn contains(container: &Value, item: &Value) -> RunResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(ExcType::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => {
            let items = items.borrow().clone();
            Ok(items.iter().any(|candidate| candidate.py_eq(item)))
        }
        Value::Tuple(items) => Ok(items.iter().any(|candidate| candidate.py_eq(item))),
        Value::Dict(dict) => dict.borrow().contains(item),
        Value::Range(range) => Ok(item.as_int().is_some_and(|i| {
            let in_bounds = if range.step > 0 {
                range.start <= i && i < range.stop
            } else {
                range.stop < i && i <= range.start
            };
            in_bounds && (i128::from(i) - i128::from(range.start)) % i128::from(range.step) == 0
        })),
        other => Err(ExcType::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn floor_division_and_modulo_round_toward_negative_infinity() {
        assert_eq!(binary_op(&int(-7), Operator::FloorDiv, &int(2)).unwrap().py_repr(), "-4");
        assert_eq!(binary_op(&int(-7), Operator::Mod, &int(2)).unwrap().py_repr(), "1");
        assert_eq!(binary_op(&int(7), Operator::Mod, &int(-2)).unwrap().py_repr(), "-1");
    }

    #[test]
    fn true_division_returns_float() {
        assert_eq!(binary_op(&int(1), Operator::Div, &int(2)).unwrap().py_repr(), "0.5");
        assert_eq!(binary_op(&int(4), Operator::Div, &int(2)).unwrap().py_repr(), "2.0");
    }

    #[test]
    fn division_by_zero() {
        let err = binary_op(&int(1), Operator::Div, &int(0)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::ZeroDivisionError);
        assert_eq!(err.message(), Some("division by zero"));
    }

    #[test]
    fn int_overflow_is_reported() {
        let err = binary_op(&int(i64::MAX), Operator::Add, &int(1)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::OverflowError);
        let err = binary_op(&int(2), Operator::Pow, &int(64)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::OverflowError);
    }

    #[test]
    fn mixed_types_raise_type_error() {
        let err = binary_op(&int(1), Operator::Add, &Value::from("a")).unwrap_err();
        assert_eq!(
            err.message(),
            Some("unsupported operand type(s) for +: 'int' and 'str'")
        );
        let err = compare(&int(1), CmpOperator::Lt, &Value::from("a")).unwrap_err();
        assert_eq!(
            err.message(),
            Some("'<' not supported between instances of 'int' and 'str'")
        );
    }

    #[test]
    fn sequence_repetition() {
        assert_eq!(binary_op(&Value::from("ab"), Operator::Mult, &int(3)).unwrap().py_repr(), "'ababab'");
        let list = Value::new_list(vec![int(1)]);
        assert_eq!(binary_op(&int(2), Operator::Mult, &list).unwrap().py_repr(), "[1, 1]");
    }

    #[test]
    fn range_membership_respects_step() {
        let range = Value::Range(crate::value::Range::new(0, 10, 3).unwrap());
        assert!(contains(&range, &int(9)).unwrap());
        assert!(!contains(&range, &int(4)).unwrap());
    }

    #[test]
    fn range_membership_spanning_the_whole_int_range() {
        let range = Value::Range(crate::value::Range::new(i64::MIN, i64::MAX, 1).unwrap());
        assert!(contains(&range, &int(i64::MAX - 1)).unwrap());
        assert!(!contains(&range, &int(i64::MAX)).unwrap());
        let stepped = Value::Range(crate::value::Range::new(i64::MIN, i64::MAX, 2).unwrap());
        assert!(contains(&stepped, &int(i64::MAX - 1)).unwrap());
        assert!(!contains(&stepped, &int(i64::MAX - 2)).unwrap());
    }

    #[test]
    fn oversized_repetition_raises_memory_error() {
        let err = binary_op(&Value::from("abc"), Operator::Mult, &int(i64::MAX)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::MemoryError);
        let list = Value::new_list(vec![int(0)]);
        let err = binary_op(&list, Operator::Mult, &int(1 << 62)).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::MemoryError);
        let tuple = Value::new_tuple(vec![int(0), int(1)]);
        let err = binary_op(&int(i64::try_from(MAX_REPEAT_LEN).unwrap()), Operator::Mult, &tuple).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::MemoryError);
        assert_eq!(binary_op(&Value::from("x"), Operator::Mult, &int(-5)).unwrap().py_repr(), "''");
    }
}
