//! Methods of builtin types (`str`, `list`, `dict`, `tuple`, `int`, `float`).

use std::rc::Rc;

use crate::{
    args::ArgValues,
    builtins::{dict_update, integer_arg},
    exception::{ExcType, RunResult},
    interp::Interp,
    value::Value,
};

impl Interp<'_> {
    /// Calls a natively implemented method; `name` is one of the receiver type's `method_names`.
    pub(crate) fn call_method(&mut self, receiver: &Value, name: &str, args: ArgValues) -> RunResult<Value> {
        match receiver {
            Value::Str(s) => str_method(s, name, args),
            Value::List(list) => self.list_method(list, name, args),
            Value::Dict(_) => dict_method(receiver, name, args),
            Value::Tuple(items) => sequence_method(items, "tuple", name, args),
            Value::Context => self.call_context_method(name, args),
            Value::Bool(_) | Value::Int(_) if name == "bit_length" => {
                args.check_zero_args("bit_length")?;
                let i = receiver.as_int().unwrap_or_default();
                Ok(Value::Int(i64::from(64 - i.unsigned_abs().leading_zeros())))
            }
            Value::Float(f) if name == "is_integer" => {
                args.check_zero_args("is_integer")?;
                Ok(Value::Bool(f.is_finite() && f.fract() == 0.0))
            }
            other => Err(ExcType::attribute_error(&other.type_name(), name)),
        }
    }

    fn list_method(
        &mut self,
        list: &Rc<std::cell::RefCell<Vec<Value>>>,
        name: &str,
        mut args: ArgValues,
    ) -> RunResult<Value> {
        match name {
            "append" => {
                let item = args.get_one_arg("list.append")?;
                list.borrow_mut().push(item);
            }
            "extend" => {
                let items = args.get_one_arg("list.extend")?.to_vec()?;
                list.borrow_mut().extend(items);
            }
            "insert" => {
                let (index, item) = args.get_two_args("insert")?;
                let index = integer_arg(&index)?;
                let mut items = list.borrow_mut();
                let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
                let position = if index < 0 { (index + len).max(0) } else { index.min(len) };
                items.insert(usize::try_from(position).unwrap_or_default(), item);
            }
            "pop" => {
                let index = args.get_zero_one_arg("pop")?;
                let mut items = list.borrow_mut();
                if items.is_empty() {
                    return Err(ExcType::index_error("pop from empty list"));
                }
                let position = match index {
                    None => items.len() - 1,
                    Some(index) => normalize_index(integer_arg(&index)?, items.len())
                        .ok_or_else(|| ExcType::index_error("pop index out of range"))?,
                };
                return Ok(items.remove(position));
            }
            "remove" => {
                let item = args.get_one_arg("list.remove")?;
                let mut items = list.borrow_mut();
                let position = items
                    .iter()
                    .position(|candidate| candidate.py_eq(&item))
                    .ok_or_else(|| ExcType::value_error("list.remove(x): x not in list"))?;
                items.remove(position);
            }
            "clear" => {
                args.check_zero_args("clear")?;
                list.borrow_mut().clear();
            }
            "copy" => {
                args.check_zero_args("copy")?;
                return Ok(Value::new_list(list.borrow().clone()));
            }
            "reverse" => {
                args.check_zero_args("reverse")?;
                list.borrow_mut().reverse();
            }
            "sort" => {
                let key = args.take_kwarg("key");
                let reverse = args.take_kwarg("reverse").is_some_and(|r| r.is_truthy());
                args.check_zero_args("sort")?;
                let mut items = std::mem::take(&mut *list.borrow_mut());
                let result = self.sort_values(&mut items, key.as_ref(), reverse);
                *list.borrow_mut() = items;
                result?;
            }
            _ => {
                let items = list.borrow().clone();
                return sequence_method(&items, "list", name, args);
            }
        }
        Ok(Value::None)
    }
}

/// `count` and `index`, shared by lists and tuples.
fn sequence_method(items: &[Value], type_name: &str, name: &str, args: ArgValues) -> RunResult<Value> {
    match name {
        "count" => {
            let item = args.get_one_arg(&format!("{type_name}.count"))?;
            let count = items.iter().filter(|candidate| candidate.py_eq(&item)).count();
            Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        }
        "index" => {
            let item = args.get_one_arg(&format!("{type_name}.index"))?;
            items
                .iter()
                .position(|candidate| candidate.py_eq(&item))
                .map(|position| Value::Int(i64::try_from(position).unwrap_or(i64::MAX)))
                .ok_or_else(|| match type_name {
                    "list" => ExcType::value_error(format!("{} is not in list", item.py_repr())),
                    _ => ExcType::value_error("tuple.index(x): x not in tuple"),
                })
        }
        _ => Err(ExcType::attribute_error(type_name, name)),
    }
}

fn dict_method(receiver: &Value, name: &str, mut args: ArgValues) -> RunResult<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(ExcType::attribute_error(&receiver.type_name(), name));
    };
    match name {
        "get" => {
            let (key, default) = args.get_one_two_args("get")?;
            Ok(dict.borrow().get(&key)?.or(default).unwrap_or(Value::None))
        }
        "keys" => {
            args.check_zero_args("keys")?;
            Ok(Value::new_list(dict.borrow().keys()))
        }
        "values" => {
            args.check_zero_args("values")?;
            Ok(Value::new_list(dict.borrow().values()))
        }
        "items" => {
            args.check_zero_args("items")?;
            let items = dict.borrow().items();
            Ok(Value::new_list(
                items
                    .into_iter()
                    .map(|(key, value)| Value::new_tuple(vec![key, value]))
                    .collect(),
            ))
        }
        "pop" => {
            let (key, default) = args.get_one_two_args("pop")?;
            let removed = dict.borrow_mut().remove(&key)?;
            match (removed, default) {
                (Some(value), _) | (None, Some(value)) => Ok(value),
                (None, None) => Err(ExcType::key_error(&key)),
            }
        }
        "setdefault" => {
            let (key, default) = args.get_one_two_args("setdefault")?;
            let existing = dict.borrow().get(&key)?;
            match existing {
                Some(value) => Ok(value),
                None => {
                    let value = default.unwrap_or(Value::None);
                    dict.borrow_mut().insert(key, value.clone())?;
                    Ok(value)
                }
            }
        }
        "update" => {
            let kwargs = std::mem::take(&mut args.kwargs);
            let source = args.get_zero_one_arg("update")?;
            // build the merge separately so `d.update(d)` does not alias the borrow
            let mut merged = dict.borrow().clone();
            if let Some(source) = source {
                dict_update(&mut merged, &source)?;
            }
            for (key, value) in kwargs {
                merged.insert(Value::Str(key), value)?;
            }
            *dict.borrow_mut() = merged;
            Ok(Value::None)
        }
        "clear" => {
            args.check_zero_args("clear")?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            args.check_zero_args("copy")?;
            Ok(Value::new_dict(dict.borrow().clone()))
        }
        _ => Err(ExcType::attribute_error("dict", name)),
    }
}

fn str_method(s: &str, name: &str, mut args: ArgValues) -> RunResult<Value> {
    match name {
        "upper" => {
            args.check_zero_args("upper")?;
            Ok(Value::from(s.to_uppercase()))
        }
        "lower" => {
            args.check_zero_args("lower")?;
            Ok(Value::from(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = match args.get_zero_one_arg(name)? {
                None | Some(Value::None) => None,
                Some(Value::Str(chars)) => Some(chars),
                Some(other) => {
                    return Err(ExcType::type_error(format!(
                        "{name} arg must be None or str, not {}",
                        other.type_name()
                    )));
                }
            };
            let matches = |c: char| chars.as_ref().map_or(c.is_whitespace(), |chars| chars.contains(c));
            let stripped = match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            Ok(Value::from(stripped))
        }
        "split" => {
            let sep_kwarg = args.take_kwarg("sep");
            let maxsplit_kwarg = args.take_kwarg("maxsplit");
            let (sep, maxsplit) = match args.positional.len() {
                0 => (sep_kwarg, maxsplit_kwarg),
                1 => (args.get_one_arg("split").ok(), maxsplit_kwarg),
                _ => {
                    let (sep, maxsplit) = args.get_two_args("split")?;
                    (Some(sep), Some(maxsplit))
                }
            };
            let maxsplit = match maxsplit {
                Some(value) => integer_arg(&value)?,
                None => -1,
            };
            let limit = usize::try_from(maxsplit).ok().map(|n| n + 1);
            let parts: Vec<Value> = match sep {
                None | Some(Value::None) => {
                    let mut parts = Vec::new();
                    let mut rest = s.trim_start();
                    while !rest.is_empty() {
                        if limit.is_some_and(|limit| parts.len() + 1 == limit) {
                            parts.push(Value::from(rest.trim_end()));
                            break;
                        }
                        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                        parts.push(Value::from(&rest[..end]));
                        rest = rest[end..].trim_start();
                    }
                    parts
                }
                Some(Value::Str(sep)) => {
                    if sep.is_empty() {
                        return Err(ExcType::value_error("empty separator"));
                    }
                    match limit {
                        Some(limit) => s.splitn(limit, &*sep).map(Value::from).collect(),
                        None => s.split(&*sep).map(Value::from).collect(),
                    }
                }
                Some(other) => {
                    return Err(ExcType::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::new_list(parts))
        }
        "join" => {
            let iterable = args.get_one_arg("str.join")?;
            let mut joined = String::new();
            for (index, item) in iterable.py_iter()?.enumerate() {
                let Value::Str(item) = item else {
                    return Err(ExcType::type_error(format!(
                        "sequence item {index}: expected str instance, {} found",
                        item.type_name()
                    )));
                };
                if index > 0 {
                    joined.push_str(s);
                }
                joined.push_str(&item);
            }
            Ok(Value::from(joined))
        }
        "startswith" | "endswith" => {
            let affix = args.get_one_arg(name)?;
            let candidates: Vec<Value> = match &affix {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in candidates {
                let Value::Str(candidate) = candidate else {
                    return Err(ExcType::type_error(format!(
                        "{name} first arg must be str or a tuple of str, not {}",
                        candidate.type_name()
                    )));
                };
                let found = if name == "startswith" {
                    s.starts_with(&*candidate)
                } else {
                    s.ends_with(&*candidate)
                };
                if found {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "replace" => {
            args.check_no_kwargs("replace")?;
            let mut positional = std::mem::take(&mut args.positional).into_iter();
            let (Some(Value::Str(old)), Some(Value::Str(new)), count, None) =
                (positional.next(), positional.next(), positional.next(), positional.next())
            else {
                return Err(ExcType::type_error("replace() expects two str arguments and an optional count"));
            };
            let replaced = match count.map(|count| integer_arg(&count)).transpose()? {
                Some(count) if count >= 0 => s.replacen(&*old, &new, usize::try_from(count).unwrap_or(usize::MAX)),
                _ => s.replace(&*old, &new),
            };
            Ok(Value::from(replaced))
        }
        "find" => {
            let needle = str_arg(args.get_one_arg("find")?, "find")?;
            Ok(Value::Int(s.find(&*needle).map_or(-1, |byte_index| {
                i64::try_from(s[..byte_index].chars().count()).unwrap_or(i64::MAX)
            })))
        }
        "count" => {
            let needle = str_arg(args.get_one_arg("count")?, "count")?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(&*needle).count()
            };
            Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        }
        _ => Err(ExcType::attribute_error("str", name)),
    }
}

fn str_arg(value: Value, method: &str) -> RunResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ExcType::type_error(format!(
            "{method}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

/// Resolves a possibly negative index against `len`; `None` when out of range.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}
