//! Builtin functions, builtin type constructors and exception constructors.

use std::{cmp::Ordering, rc::Rc, str::FromStr};

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    args::ArgValues,
    exception::{ExcType, Exception, RunResult},
    interp::Interp,
    value::{Dict, Introspectable, Range, Type, Value},
};

/// Everything that resolves through the builtin scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtins {
    Function(BuiltinFunction),
    /// A builtin type, callable as a constructor.
    Type(Type),
    /// An exception type, callable to create an exception instance.
    ExcType(ExcType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum BuiltinFunction {
    Abs,
    Dir,
    Enumerate,
    Getattr,
    Hasattr,
    Isinstance,
    Len,
    Max,
    Min,
    Print,
    Repr,
    Sorted,
    Sum,
    Zip,
}

impl Builtins {
    /// Resolves a name that is not bound in any user scope.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Ok(function) = BuiltinFunction::from_str(name) {
            return Some(Self::Function(function));
        }
        if let Some(type_) = Type::CONSTRUCTORS.into_iter().find(|t| <&str>::from(*t) == name) {
            return Some(Self::Type(type_));
        }
        ExcType::from_str(name).ok().map(Self::ExcType)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Function(function) => function.into(),
            Self::Type(type_) => type_.into(),
            Self::ExcType(exc_type) => exc_type.into(),
        }
    }

    pub fn py_repr(self) -> String {
        match self {
            Self::Function(function) => format!("<built-in function {function}>"),
            Self::Type(type_) => format!("<class '{type_}'>"),
            Self::ExcType(exc_type) => format!("<class '{exc_type}'>"),
        }
    }
}

impl Interp<'_> {
    pub(crate) fn call_builtin(&mut self, builtin: Builtins, args: ArgValues) -> RunResult<Value> {
        match builtin {
            Builtins::Function(function) => self.call_builtin_function(function, args),
            Builtins::Type(type_) => self.construct_type(type_, args),
            Builtins::ExcType(exc_type) => construct_exception(exc_type, args),
        }
    }

    fn call_builtin_function(&mut self, function: BuiltinFunction, mut args: ArgValues) -> RunResult<Value> {
        match function {
            BuiltinFunction::Print => {
                let sep = self.text_kwarg(&mut args, "sep", " ")?;
                let end = self.text_kwarg(&mut args, "end", "\n")?;
                args.check_no_kwargs("print")?;
                let mut text = String::new();
                for (index, value) in args.positional.iter().enumerate() {
                    if index > 0 {
                        text.push_str(&sep);
                    }
                    text.push_str(&self.to_str(value)?);
                }
                text.push_str(&end);
                self.write(&text)?;
                Ok(Value::None)
            }
            BuiltinFunction::Len => {
                let value = args.get_one_arg("len")?;
                self.len(&value).map(|len| Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
            }
            BuiltinFunction::Repr => {
                let value = args.get_one_arg("repr")?;
                self.repr(&value).map(Value::from)
            }
            BuiltinFunction::Isinstance => {
                let (value, class_info) = args.get_two_args("isinstance")?;
                isinstance(&value, &class_info).map(Value::Bool)
            }
            BuiltinFunction::Dir => {
                let mut names = match args.get_zero_one_arg("dir")? {
                    Some(value) => value.attribute_names(),
                    None => self.scope_names(),
                };
                names.sort();
                names.dedup();
                Ok(Value::new_list(names.into_iter().map(Value::from).collect()))
            }
            BuiltinFunction::Abs => match args.get_one_arg("abs")? {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => match other.as_int() {
                    Some(i) => i.checked_abs().map(Value::Int).ok_or_else(ExcType::overflow),
                    None => Err(ExcType::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                },
            },
            BuiltinFunction::Min => self.min_max(args, "min", Ordering::Less),
            BuiltinFunction::Max => self.min_max(args, "max", Ordering::Greater),
            BuiltinFunction::Sum => {
                let start = args.take_kwarg("start");
                let (iterable, positional_start) = args.get_one_two_args("sum")?;
                let mut total = positional_start.or(start).unwrap_or(Value::Int(0));
                if matches!(total, Value::Str(_)) {
                    return Err(ExcType::type_error(
                        "sum() can't sum strings [use ''.join(seq) instead]",
                    ));
                }
                for item in iterable.py_iter()? {
                    total = crate::ops::binary_op(&total, crate::expressions::Operator::Add, &item)?;
                }
                Ok(total)
            }
            BuiltinFunction::Sorted => {
                let key = args.take_kwarg("key");
                let reverse = args.take_kwarg("reverse").is_some_and(|r| r.is_truthy());
                let iterable = args.get_one_arg("sorted")?;
                let mut items = iterable.to_vec()?;
                self.sort_values(&mut items, key.as_ref(), reverse)?;
                Ok(Value::new_list(items))
            }
            BuiltinFunction::Enumerate => {
                let start = args.take_kwarg("start");
                let (iterable, positional_start) = args.get_one_two_args("enumerate")?;
                let start = match positional_start.or(start) {
                    Some(value) => integer_arg(&value)?,
                    None => 0,
                };
                let items = iterable
                    .py_iter()?
                    .zip(start..)
                    .map(|(item, index)| Value::new_tuple(vec![Value::Int(index), item]))
                    .collect();
                Ok(Value::new_list(items))
            }
            BuiltinFunction::Zip => {
                args.check_no_kwargs("zip")?;
                let columns = args
                    .positional
                    .iter()
                    .map(Value::to_vec)
                    .collect::<RunResult<Vec<_>>>()?;
                let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
                let items = (0..rows)
                    .map(|row| Value::new_tuple(columns.iter().map(|column| column[row].clone()).collect()))
                    .collect();
                Ok(Value::new_list(items))
            }
            BuiltinFunction::Hasattr => {
                let (value, name) = args.get_two_args("hasattr")?;
                let name = attribute_name_arg(&name, "hasattr")?;
                match self.get_attr(&value, &name) {
                    Ok(_) => Ok(Value::Bool(true)),
                    Err(exc) if exc.exc_type() == ExcType::AttributeError => Ok(Value::Bool(false)),
                    Err(exc) => Err(exc),
                }
            }
            BuiltinFunction::Getattr => {
                args.check_no_kwargs("getattr")?;
                let count = args.count();
                let mut positional = std::mem::take(&mut args.positional).into_iter();
                let (Some(value), Some(name), default, None) =
                    (positional.next(), positional.next(), positional.next(), positional.next())
                else {
                    return Err(ExcType::type_error(format!(
                        "getattr expected 2 or 3 arguments, got {count}"
                    )));
                };
                let name = attribute_name_arg(&name, "getattr")?;
                match (self.get_attr(&value, &name), default) {
                    (Err(exc), Some(default)) if exc.exc_type() == ExcType::AttributeError => Ok(default),
                    (result, _) => result,
                }
            }
        }
    }

    /// Reads an optional `sep`/`end` style keyword that must be `str` or `None`.
    fn text_kwarg(&mut self, args: &mut ArgValues, name: &str, default: &str) -> RunResult<String> {
        match args.take_kwarg(name) {
            None | Some(Value::None) => Ok(default.to_owned()),
            Some(Value::Str(s)) => Ok(s.to_string()),
            Some(other) => Err(ExcType::type_error(format!(
                "{name} must be None or a string, not {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn len(&mut self, value: &Value) -> RunResult<usize> {
        match value {
            Value::Str(s) => Ok(s.chars().count()),
            Value::List(items) => Ok(items.borrow().len()),
            Value::Tuple(items) => Ok(items.len()),
            Value::Dict(dict) => Ok(dict.borrow().len()),
            Value::Range(range) => Ok(range.len()),
            Value::Instance(instance) if instance.class.lookup("__len__").is_some() => {
                let result = self.call_method_by_name(value, "__len__", ArgValues::default())?;
                match result.as_int() {
                    Some(len) if len >= 0 => Ok(usize::try_from(len).unwrap_or(usize::MAX)),
                    Some(_) => Err(ExcType::value_error("__len__() should return >= 0")),
                    None => Err(ExcType::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        result.type_name()
                    ))),
                }
            }
            other => Err(ExcType::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        }
    }

    fn min_max(&mut self, mut args: ArgValues, name: &str, wanted: Ordering) -> RunResult<Value> {
        let key = args.take_kwarg("key");
        let default = args.take_kwarg("default");
        args.check_no_kwargs(name)?;
        let items = match args.positional.len() {
            0 => return Err(ExcType::type_error_at_least(name, 1, 0)),
            1 => args.positional.remove(0).to_vec()?,
            _ => args.positional,
        };
        let mut best: Option<(Value, Value)> = None;
        for item in items {
            let item_key = match &key {
                Some(key) => self.call_value(key, ArgValues::positional(vec![item.clone()]))?,
                None => item.clone(),
            };
            let replace = match &best {
                None => true,
                Some((_, best_key)) => {
                    crate::ops::compare(
                        &item_key,
                        if wanted == Ordering::Less {
                            crate::expressions::CmpOperator::Lt
                        } else {
                            crate::expressions::CmpOperator::Gt
                        },
                        best_key,
                    )?
                }
            };
            if replace {
                best = Some((item, item_key));
            }
        }
        match (best, default) {
            (Some((item, _)), _) => Ok(item),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(ExcType::value_error(format!("{name}() iterable argument is empty"))),
        }
    }

    /// Sorts in place by natural order or by `key(item)`; stable like `list.sort`.
    pub(crate) fn sort_values(&mut self, items: &mut Vec<Value>, key: Option<&Value>, reverse: bool) -> RunResult<()> {
        let keys = match key {
            Some(Value::None) | None => items.clone(),
            Some(key) => items
                .iter()
                .map(|item| self.call_value(key, ArgValues::positional(vec![item.clone()])))
                .collect::<RunResult<Vec<_>>>()?,
        };
        let mut keyed: Vec<(Value, Value)> = keys.into_iter().zip(items.drain(..)).collect();
        let mut error: Option<Exception> = None;
        keyed.sort_by(|(a, _), (b, _)| {
            let ordering = a.py_cmp(b).unwrap_or_else(|| {
                if error.is_none() {
                    error = Some(ExcType::type_error(format!(
                        "'<' not supported between instances of '{}' and '{}'",
                        a.type_name(),
                        b.type_name()
                    )));
                }
                Ordering::Equal
            });
            if reverse { ordering.reverse() } else { ordering }
        });
        items.extend(keyed.into_iter().map(|(_, item)| item));
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn construct_type(&mut self, type_: Type, mut args: ArgValues) -> RunResult<Value> {
        match type_ {
            Type::Bool => Ok(Value::Bool(
                args.get_zero_one_arg("bool")?.is_some_and(|value| value.is_truthy()),
            )),
            Type::Int => match args.get_zero_one_arg("int")? {
                None => Ok(Value::Int(0)),
                Some(value) => to_int(&value).map(Value::Int),
            },
            Type::Float => match args.get_zero_one_arg("float")? {
                None => Ok(Value::Float(0.0)),
                Some(value) => to_float(&value).map(Value::Float),
            },
            Type::Str => match args.get_zero_one_arg("str")? {
                None => Ok(Value::from("")),
                Some(value) => self.to_str(&value).map(Value::from),
            },
            Type::List => match args.get_zero_one_arg("list")? {
                None => Ok(Value::new_list(Vec::new())),
                Some(value) => value.to_vec().map(Value::new_list),
            },
            Type::Tuple => match args.get_zero_one_arg("tuple")? {
                None => Ok(Value::new_tuple(Vec::new())),
                Some(value @ Value::Tuple(_)) => Ok(value),
                Some(value) => value.to_vec().map(Value::new_tuple),
            },
            Type::Dict => {
                let kwargs = std::mem::take(&mut args.kwargs);
                let mut dict = Dict::default();
                if let Some(source) = args.get_zero_one_arg("dict")? {
                    dict_update(&mut dict, &source)?;
                }
                for (key, value) in kwargs {
                    dict.insert(Value::Str(key), value)?;
                }
                Ok(Value::new_dict(dict))
            }
            Type::Range => {
                let (first, second, third) = args.get_one_to_three_args("range")?;
                let range = match (second, third) {
                    (None, _) => Range::new(0, integer_arg(&first)?, 1)?,
                    (Some(stop), None) => Range::new(integer_arg(&first)?, integer_arg(&stop)?, 1)?,
                    (Some(stop), Some(step)) => {
                        Range::new(integer_arg(&first)?, integer_arg(&stop)?, integer_arg(&step)?)?
                    }
                };
                Ok(Value::Range(range))
            }
            Type::Type => {
                if args.positional.len() == 1 && args.kwargs.is_empty() {
                    Ok(args.get_one_arg("type")?.type_object())
                } else {
                    Err(ExcType::type_error("type() takes 1 argument"))
                }
            }
            other => Err(ExcType::type_error(format!("cannot create '{other}' instances"))),
        }
    }
}

fn construct_exception(exc_type: ExcType, args: ArgValues) -> RunResult<Value> {
    args.check_no_kwargs(exc_type.into())?;
    let message = match args.positional.as_slice() {
        [] => None,
        [single] => Some(single.py_str()),
        many => Some(Value::new_tuple(many.to_vec()).py_repr()),
    };
    Ok(Value::Exception(Rc::new(Exception::new(exc_type, message))))
}

/// `isinstance(value, class_info)`; `class_info` may be a tuple of classes.
fn isinstance(value: &Value, class_info: &Value) -> RunResult<bool> {
    match class_info {
        Value::Builtin(Builtins::Type(type_)) => Ok(match value {
            Value::Instance(_) | Value::Exception(_) => false,
            // bool is a subclass of int
            Value::Bool(_) if *type_ == Type::Int => true,
            other => other.py_type() == *type_,
        }),
        Value::Builtin(Builtins::ExcType(exc_type)) => Ok(match value {
            Value::Exception(exc) => exc.exc_type().is_subclass_of(*exc_type),
            _ => false,
        }),
        Value::Class(class) => Ok(match value {
            Value::Instance(instance) => Rc::ptr_eq(&instance.class, class),
            _ => false,
        }),
        Value::Tuple(options) => {
            for option in options.iter() {
                if isinstance(value, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(ExcType::type_error(
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        )),
    }
}

/// Merges a dict or an iterable of key/value pairs into `dict`.
pub(crate) fn dict_update(dict: &mut Dict, source: &Value) -> RunResult<()> {
    if let Value::Dict(other) = source {
        let items = other.borrow().items();
        for (key, value) in items {
            dict.insert(key, value)?;
        }
        return Ok(());
    }
    for (index, item) in source.py_iter()?.enumerate() {
        let pair = item.to_vec().map_err(|_| {
            ExcType::type_error(format!(
                "cannot convert dictionary update sequence element #{index} to a sequence"
            ))
        })?;
        let [key, value] = <[Value; 2]>::try_from(pair).map_err(|pair| {
            ExcType::value_error(format!(
                "dictionary update sequence element #{index} has length {}; 2 is required",
                pair.len()
            ))
        })?;
        dict.insert(key, value)?;
    }
    Ok(())
}

fn attribute_name_arg(name: &Value, function: &str) -> RunResult<Rc<str>> {
    match name {
        Value::Str(s) => Ok(Rc::clone(s)),
        other => Err(ExcType::type_error(format!(
            "{function}(): attribute name must be string, not '{}'",
            other.type_name()
        ))),
    }
}

/// An argument that must be an integer, e.g. for `range()`.
pub(crate) fn integer_arg(value: &Value) -> RunResult<i64> {
    value.as_int().ok_or_else(|| {
        ExcType::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

fn to_int(value: &Value) -> RunResult<i64> {
    match value {
        Value::Float(f) => {
            if f.is_nan() {
                Err(ExcType::value_error("cannot convert float NaN to integer"))
            } else if f.is_infinite() {
                Err(Exception::new_msg(
                    ExcType::OverflowError,
                    "cannot convert float infinity to integer",
                ))
            } else if f.trunc() >= -9.223_372_036_854_776e18 && f.trunc() < 9.223_372_036_854_776e18 {
                #[expect(clippy::cast_possible_truncation, reason = "checked to be within i64 range")]
                let truncated = f.trunc() as i64;
                Ok(truncated)
            } else {
                Err(ExcType::overflow())
            }
        }
        Value::Str(s) => {
            let cleaned = s.trim().replace('_', "");
            cleaned.parse::<i64>().map_err(|_| {
                ExcType::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    value.py_repr()
                ))
            })
        }
        other => other.as_int().ok_or_else(|| {
            ExcType::type_error(format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_float(value: &Value) -> RunResult<f64> {
    match value {
        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
            ExcType::value_error(format!("could not convert string to float: {}", value.py_repr()))
        }),
        other => other.as_float().ok_or_else(|| {
            ExcType::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_in_priority_order() {
        assert_eq!(Builtins::from_name("len"), Some(Builtins::Function(BuiltinFunction::Len)));
        assert_eq!(Builtins::from_name("int"), Some(Builtins::Type(Type::Int)));
        assert_eq!(Builtins::from_name("KeyError"), Some(Builtins::ExcType(ExcType::KeyError)));
        assert_eq!(Builtins::from_name("function"), None);
        assert_eq!(Builtins::from_name("NoneType"), None);
        assert_eq!(Builtins::from_name("nope"), None);
    }

    #[test]
    fn int_conversion_edge_cases() {
        assert_eq!(to_int(&Value::Float(-2.7)).unwrap(), -2);
        assert_eq!(to_int(&Value::from(" 1_000 ")).unwrap(), 1000);
        let err = to_int(&Value::from("abc")).unwrap_err();
        assert_eq!(err.message(), Some("invalid literal for int() with base 10: 'abc'"));
        assert_eq!(to_int(&Value::Float(f64::NAN)).unwrap_err().exc_type(), ExcType::ValueError);
    }

    #[test]
    fn exception_constructor_message() {
        let Value::Exception(exc) = construct_exception(ExcType::ValueError, ArgValues::positional(vec![Value::from("bad")])).unwrap() else {
            panic!("expected exception value");
        };
        assert_eq!(exc.summary(), "ValueError: bad");
    }
}
