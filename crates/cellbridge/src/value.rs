//! Runtime values of the interpreter.
//!
//! Containers share ownership through `Rc<RefCell<..>>` so that aliasing behaves as in
//! Python (`b = a; b.append(1)` is visible through `a`). The session is single-threaded,
//! so no value is `Send`.

use std::{
    cell::RefCell,
    cmp::Ordering,
    fmt::{self, Write},
    rc::Rc,
};

use ahash::AHashMap;
use indexmap::IndexMap;
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    builtins::Builtins,
    context::CONTEXT_METHODS,
    exception::{ExcType, Exception, RunResult},
    expressions::FunctionDef,
    host::HostValue,
};

/// Represents the Python type of a builtin value.
///
/// User classes and exception types are not listed here: their instances report the class
/// or exception name instead (see [`Value::type_name`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Type {
    #[strum(serialize = "NoneType")]
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    Range,
    Type,
    Function,
    #[strum(serialize = "builtin_function_or_method")]
    BuiltinFunction,
    Method,
    #[strum(serialize = "SessionContext")]
    SessionContext,
}

impl Type {
    /// Types that are bound as builtin names and can be called as constructors.
    pub const CONSTRUCTORS: [Self; 9] = [
        Self::Bool,
        Self::Int,
        Self::Float,
        Self::Str,
        Self::List,
        Self::Tuple,
        Self::Dict,
        Self::Range,
        Self::Type,
    ];

    /// Names of the methods implemented for values of this type.
    pub fn method_names(self) -> &'static [&'static str] {
        match self {
            Self::Str => &[
                "count",
                "endswith",
                "find",
                "join",
                "lower",
                "lstrip",
                "replace",
                "rstrip",
                "split",
                "startswith",
                "strip",
                "upper",
            ],
            Self::List => &[
                "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse", "sort",
            ],
            Self::Dict => &[
                "clear",
                "copy",
                "get",
                "items",
                "keys",
                "pop",
                "setdefault",
                "update",
                "values",
            ],
            Self::Tuple => &["count", "index"],
            Self::Int | Self::Bool => &["bit_length"],
            Self::Float => &["is_integer"],
            Self::SessionContext => &CONTEXT_METHODS,
            _ => &[],
        }
    }
}

/// Dunder attributes every object reports; they exist for `dir()` fidelity.
const OBJECT_DUNDERS: [&str; 9] = [
    "__class__",
    "__doc__",
    "__eq__",
    "__hash__",
    "__init__",
    "__ne__",
    "__new__",
    "__repr__",
    "__str__",
];

#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Range(Range),
    Function(Rc<Function>),
    Builtin(Builtins),
    Method(Rc<BoundMethod>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Exception(Rc<Exception>),
    /// The session context object bound under the configured context name.
    Context,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl Value {
    pub fn new_list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn new_tuple(items: Vec<Self>) -> Self {
        Self::Tuple(Rc::from(items))
    }

    pub fn new_dict(dict: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    /// Builtin type of the value. Instances and exceptions are named by [`Self::type_name`] instead.
    pub fn py_type(&self) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Str(_) => Type::Str,
            Self::List(_) => Type::List,
            Self::Tuple(_) => Type::Tuple,
            Self::Dict(_) => Type::Dict,
            Self::Range(_) => Type::Range,
            Self::Function(_) => Type::Function,
            Self::Builtin(Builtins::Function(_)) => Type::BuiltinFunction,
            Self::Builtin(Builtins::Type(_) | Builtins::ExcType(_)) | Self::Class(_) => Type::Type,
            Self::Method(_) => Type::Method,
            Self::Context => Type::SessionContext,
            // never consulted for these; `type_name` covers them
            Self::Instance(_) | Self::Exception(_) => Type::Type,
        }
    }

    /// The value's type as a first-class value, i.e. `type(value)`.
    pub fn type_object(&self) -> Self {
        match self {
            Self::Instance(instance) => Self::Class(Rc::clone(&instance.class)),
            Self::Exception(exc) => Self::Builtin(Builtins::ExcType(exc.exc_type())),
            other => Self::Builtin(Builtins::Type(other.py_type())),
        }
    }

    /// Name of the value's type as used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Self::Instance(instance) => instance.class.name.to_string(),
            Self::Exception(exc) => exc.exc_type().to_string(),
            other => other.py_type().to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(list) => !list.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(dict) => !dict.borrow().is_empty(),
            Self::Range(range) => !range.is_empty(),
            _ => true,
        }
    }

    /// Numeric view used by arithmetic and comparisons; `bool` counts as `int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Bool(_) | Self::Int(_) => self.as_int().map(|i| i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// `repr(value)` without calling user-defined `__repr__` methods.
    pub fn py_repr(&self) -> String {
        let mut out = String::new();
        // the no-op hook never fails
        let _ = self.write_repr(&mut out, &mut Vec::new(), &mut |_| Ok(None));
        out
    }

    /// `str(value)` without calling user-defined `__str__` methods.
    pub fn py_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            Self::Exception(exc) => exc.py_str(),
            other => other.py_repr(),
        }
    }

    /// Writes `repr(value)` into `out`.
    ///
    /// `instance_repr` is consulted for every user instance, including those nested in
    /// containers, so the interpreter can run a user `__repr__`. `seen` holds the
    /// containers currently being written and turns self-references into `[...]`.
    pub fn write_repr(
        &self,
        out: &mut String,
        seen: &mut Vec<usize>,
        instance_repr: &mut dyn FnMut(&Rc<Instance>) -> RunResult<Option<String>>,
    ) -> RunResult<()> {
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => write_infallible(out, format_args!("{i}")),
            Self::Float(f) => out.push_str(&float_repr(*f)),
            Self::Str(s) => string_repr_fmt(s, out),
            Self::List(list) => {
                let id = Rc::as_ptr(list).addr();
                if seen.contains(&id) {
                    out.push_str("[...]");
                    return Ok(());
                }
                seen.push(id);
                let items = list.borrow().clone();
                out.push('[');
                write_sequence(&items, out, seen, instance_repr)?;
                out.push(']');
                seen.pop();
            }
            Self::Tuple(items) => {
                out.push('(');
                write_sequence(items, out, seen, instance_repr)?;
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::Dict(dict) => {
                let id = Rc::as_ptr(dict).addr();
                if seen.contains(&id) {
                    out.push_str("{...}");
                    return Ok(());
                }
                seen.push(id);
                let items = dict.borrow().items();
                out.push('{');
                for (index, (key, value)) in items.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out, seen, instance_repr)?;
                    out.push_str(": ");
                    value.write_repr(out, seen, instance_repr)?;
                }
                out.push('}');
                seen.pop();
            }
            Self::Range(range) => {
                if range.step == 1 {
                    write_infallible(out, format_args!("range({}, {})", range.start, range.stop));
                } else {
                    write_infallible(
                        out,
                        format_args!("range({}, {}, {})", range.start, range.stop, range.step),
                    );
                }
            }
            Self::Function(function) => write_infallible(
                out,
                format_args!(
                    "<function {} at 0x{:012x}>",
                    function.def.name,
                    Rc::as_ptr(function).addr()
                ),
            ),
            Self::Builtin(builtin) => out.push_str(&builtin.py_repr()),
            Self::Method(method) => match &method.kind {
                MethodKind::User(function) => {
                    write_infallible(
                        out,
                        format_args!("<bound method {}.{} of ", method.receiver.type_name(), function.def.name),
                    );
                    method.receiver.write_repr(out, seen, instance_repr)?;
                    out.push('>');
                }
                MethodKind::Builtin(name) => write_infallible(
                    out,
                    format_args!(
                        "<built-in method {name} of {} object at 0x{:012x}>",
                        method.receiver.type_name(),
                        Rc::as_ptr(method).addr()
                    ),
                ),
            },
            Self::Class(class) => write_infallible(out, format_args!("<class '__main__.{}'>", class.name)),
            Self::Instance(instance) => match instance_repr(instance)? {
                Some(repr) => out.push_str(&repr),
                None => write_infallible(
                    out,
                    format_args!(
                        "<__main__.{} object at 0x{:012x}>",
                        instance.class.name,
                        Rc::as_ptr(instance).addr()
                    ),
                ),
            },
            Self::Exception(exc) => out.push_str(&exc.py_repr()),
            Self::Context => out.push_str("<SessionContext>"),
        }
        Ok(())
    }

    /// Python `==` for values that do not involve user-defined `__eq__`.
    pub fn py_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::Context, Self::Context) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Float(_), _) | (_, Self::Float(_)) => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Self::Bool(_) | Self::Int(_), Self::Bool(_) | Self::Int(_)) => self.as_int() == other.as_int(),
            (Self::List(a), Self::List(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow().clone(), b.borrow().clone());
                    sequences_eq(&a, &b)
                }
            }
            (Self::Tuple(a), Self::Tuple(b)) => sequences_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b) || a.borrow().py_eq(&b.borrow()),
            (Self::Range(a), Self::Range(b)) => a.same_items(b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Method(a), Self::Method(b)) => {
                a.receiver.is(&b.receiver)
                    && match (&a.kind, &b.kind) {
                        (MethodKind::User(x), MethodKind::User(y)) => Rc::ptr_eq(x, y),
                        (MethodKind::Builtin(x), MethodKind::Builtin(y)) => x == y,
                        _ => false,
                    }
            }
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Rc::ptr_eq(a, b),
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Python `is`: identity for shared objects, equality for immutable scalars.
    pub fn is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::Context, Self::Context) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Method(a), Self::Method(b)) => Rc::ptr_eq(a, b),
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Function(_), _)
            | (Self::Builtin(_), _)
            | (Self::Class(_), _)
            | (Self::Instance(_), _)
            | (Self::Exception(_), _) => self.py_eq(other),
            _ => false,
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`; `None` when the types are not orderable.
    pub fn py_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(_) | Self::Int(_), Self::Bool(_) | Self::Int(_)) => {
                Some(self.as_int()?.cmp(&other.as_int()?))
            }
            (Self::Float(_), _) | (_, Self::Float(_)) => self.as_float()?.partial_cmp(&other.as_float()?),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                sequences_cmp(&a, &b)
            }
            (Self::Tuple(a), Self::Tuple(b)) => sequences_cmp(a, b),
            _ => None,
        }
    }

    /// Iterates the value the way a `for` loop would.
    pub fn py_iter(&self) -> RunResult<ValueIter> {
        match self {
            Self::List(list) => Ok(ValueIter::List {
                list: Rc::clone(list),
                index: 0,
            }),
            Self::Tuple(items) => Ok(ValueIter::Items(items.to_vec().into_iter())),
            Self::Str(s) => Ok(ValueIter::Items(
                s.chars().map(|c| Self::from(c.to_string())).collect::<Vec<_>>().into_iter(),
            )),
            Self::Dict(dict) => Ok(ValueIter::Items(dict.borrow().keys().into_iter())),
            Self::Range(range) => Ok(ValueIter::Range {
                next: range.start,
                stop: range.stop,
                step: range.step,
            }),
            Self::Context => Err(ExcType::type_error_not_iterable("SessionContext")),
            other => Err(ExcType::type_error_not_iterable(&other.type_name())),
        }
    }

    /// Collects every item of an iterable value.
    pub fn to_vec(&self) -> RunResult<Vec<Self>> {
        Ok(self.py_iter()?.collect())
    }

    /// Converts the value for the host's shared store, the way `json.dumps` would.
    pub fn to_host(&self) -> RunResult<HostValue> {
        match self {
            Self::None => Ok(HostValue::Null),
            Self::Bool(b) => Ok(HostValue::Bool(*b)),
            Self::Int(i) => Ok(HostValue::from(*i)),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(HostValue::Number)
                .ok_or_else(|| ExcType::value_error("Out of range float values are not JSON compliant")),
            Self::Str(s) => Ok(HostValue::String(s.to_string())),
            Self::List(list) => {
                let items = list.borrow().clone();
                items.iter().map(Self::to_host).collect::<RunResult<_>>().map(HostValue::Array)
            }
            Self::Tuple(items) => items.iter().map(Self::to_host).collect::<RunResult<_>>().map(HostValue::Array),
            Self::Dict(dict) => {
                let items = dict.borrow().items();
                let mut map = serde_json::Map::with_capacity(items.len());
                for (key, value) in &items {
                    let key = match key {
                        Self::Str(s) => s.to_string(),
                        Self::None => "null".to_owned(),
                        Self::Bool(b) => b.to_string(),
                        Self::Int(_) | Self::Float(_) => key.py_repr(),
                        other => {
                            return Err(ExcType::type_error(format!(
                                "keys must be str, int, float, bool or None, not {}",
                                other.type_name()
                            )));
                        }
                    };
                    map.insert(key, value.to_host()?);
                }
                Ok(HostValue::Object(map))
            }
            other => Err(ExcType::type_error(format!(
                "Object of type {} is not JSON serializable",
                other.type_name()
            ))),
        }
    }

    /// Converts a host value into a fresh Python value.
    pub fn from_host(value: &HostValue) -> Self {
        match value {
            HostValue::Null => Self::None,
            HostValue::Bool(b) => Self::Bool(*b),
            HostValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            HostValue::String(s) => Self::from(s.as_str()),
            HostValue::Array(items) => Self::new_list(items.iter().map(Self::from_host).collect()),
            HostValue::Object(map) => {
                let mut dict = Dict::default();
                for (key, value) in map {
                    dict.insert_str(key, Self::from_host(value));
                }
                Self::new_dict(dict)
            }
        }
    }
}

/// Attribute enumeration used by `dir()` and name completion.
pub trait Introspectable {
    /// Every attribute name reachable on the value, unsorted and possibly with duplicates.
    fn attribute_names(&self) -> Vec<String>;
}

impl Introspectable for Value {
    fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = OBJECT_DUNDERS.iter().map(|name| (*name).to_owned()).collect();
        match self {
            Self::Instance(instance) => {
                names.push("__dict__".to_owned());
                names.extend(instance.attrs.borrow().keys().map(ToString::to_string));
                names.extend(instance.class.attrs.borrow().keys().map(ToString::to_string));
            }
            Self::Class(class) => {
                names.extend(["__dict__", "__name__"].map(str::to_owned));
                names.extend(class.attrs.borrow().keys().map(ToString::to_string));
            }
            Self::Exception(_) => names.push("args".to_owned()),
            Self::Function(_) | Self::Builtin(_) => names.push("__name__".to_owned()),
            other => names.extend(other.py_type().method_names().iter().map(|name| (*name).to_owned())),
        }
        names
    }
}

/// Hashable form of a dict key.
///
/// Numeric keys are normalised so `1`, `1.0` and `True` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DictKey {
    None,
    Int(i64),
    /// Non-integral float, by bit pattern.
    Float(u64),
    Str(Rc<str>),
    Tuple(Box<[DictKey]>),
    /// Objects hashed by identity.
    Identity(usize),
    Named(&'static str),
}

impl DictKey {
    pub fn from_value(value: &Value) -> RunResult<Self> {
        match value {
            Value::None => Ok(Self::None),
            Value::Bool(_) | Value::Int(_) => Ok(Self::Int(value.as_int().unwrap_or_default())),
            Value::Float(f) => Ok(float_key(*f)),
            Value::Str(s) => Ok(Self::Str(Rc::clone(s))),
            Value::Tuple(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<RunResult<Box<[_]>>>()
                .map(Self::Tuple),
            Value::Function(f) => Ok(Self::Identity(Rc::as_ptr(f).addr())),
            Value::Class(c) => Ok(Self::Identity(Rc::as_ptr(c).addr())),
            Value::Instance(i) => Ok(Self::Identity(Rc::as_ptr(i).addr())),
            Value::Exception(e) => Ok(Self::Identity(Rc::as_ptr(e).addr())),
            Value::Builtin(b) => Ok(Self::Named(b.name())),
            Value::Context => Ok(Self::Named("SessionContext")),
            other => Err(ExcType::type_error_unhashable(&other.type_name())),
        }
    }
}

fn float_key(f: f64) -> DictKey {
    let integral = f.fract() == 0.0 && (-9.223_372_036_854_776e18..9.223_372_036_854_776e18).contains(&f);
    #[expect(clippy::cast_possible_truncation, reason = "integral and within i64 range")]
    let truncated = f as i64;
    if integral {
        DictKey::Int(truncated)
    } else {
        DictKey::Float(f.to_bits())
    }
}

/// Insertion-ordered dict storing the original key value next to each entry.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dict {
    map: IndexMap<DictKey, (Value, Value)>,
}

impl Dict {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &Value) -> RunResult<Option<Value>> {
        let key = DictKey::from_value(key)?;
        Ok(self.map.get(&key).map(|(_, value)| value.clone()))
    }

    pub fn contains(&self, key: &Value) -> RunResult<bool> {
        Ok(self.map.contains_key(&DictKey::from_value(key)?))
    }

    /// Inserts or replaces; an existing entry keeps its position and original key.
    pub fn insert(&mut self, key: Value, value: Value) -> RunResult<()> {
        let hashed = DictKey::from_value(&key)?;
        match self.map.get_mut(&hashed) {
            Some(entry) => entry.1 = value,
            None => {
                self.map.insert(hashed, (key, value));
            }
        }
        Ok(())
    }

    pub fn insert_str(&mut self, key: &str, value: Value) {
        let key: Rc<str> = Rc::from(key);
        self.map
            .insert(DictKey::Str(Rc::clone(&key)), (Value::Str(key), value));
    }

    pub fn remove(&mut self, key: &Value) -> RunResult<Option<Value>> {
        let key = DictKey::from_value(key)?;
        Ok(self.map.shift_remove(&key).map(|(_, value)| value))
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.map.values().map(|(key, _)| key.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.map.values().map(|(_, value)| value.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.map.values().cloned().collect()
    }

    fn py_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.map.iter().all(|(key, (_, value))| {
                other
                    .map
                    .get(key)
                    .is_some_and(|(_, other_value)| value.py_eq(other_value))
            })
    }
}

/// A `range` object; iteration is lazy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn new(start: i64, stop: i64, step: i64) -> RunResult<Self> {
        if step == 0 {
            return Err(ExcType::value_error("range() arg 3 must not be zero"));
        }
        Ok(Self { start, stop, step })
    }

    pub fn len(&self) -> usize {
        let (start, stop, step) = (i128::from(self.start), i128::from(self.stop), i128::from(self.step));
        let len = if step > 0 && start < stop {
            (stop - start + step - 1) / step
        } else if step < 0 && start > stop {
            (start - stop - step - 1) / -step
        } else {
            0
        };
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let offset = i64::try_from(index).ok()?.checked_mul(self.step)?;
        self.start.checked_add(offset)
    }

    /// Whether both ranges yield the same items, decided from length, first item and step.
    pub fn same_items(&self, other: &Self) -> bool {
        let len = self.len();
        if len != other.len() {
            return false;
        }
        match len {
            0 => true,
            1 => self.start == other.start,
            _ => self.start == other.start && self.step == other.step,
        }
    }
}

/// A user-defined function or lambda together with its evaluated defaults.
#[derive(Debug)]
pub(crate) struct Function {
    pub def: Rc<FunctionDef>,
    /// Evaluated defaults, parallel to the positional parameters.
    pub defaults: Vec<Option<Value>>,
    /// Evaluated defaults, parallel to the keyword-only parameters.
    pub kw_defaults: Vec<Option<Value>>,
    /// Enclosing function scopes visible to the body, innermost first.
    pub captured: Vec<Scope>,
}

/// A function-local scope, shared with the closures created inside it.
pub(crate) type Scope = Rc<RefCell<AHashMap<Rc<str>, Value>>>;

#[derive(Debug)]
pub(crate) struct Class {
    pub name: Rc<str>,
    pub attrs: RefCell<AHashMap<Rc<str>, Value>>,
}

impl Class {
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }
}

#[derive(Debug)]
pub(crate) struct Instance {
    pub class: Rc<Class>,
    pub attrs: RefCell<AHashMap<Rc<str>, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            attrs: RefCell::new(AHashMap::new()),
        }
    }
}

/// A method looked up on a value but not yet called, e.g. `f = items.append`.
#[derive(Debug)]
pub(crate) struct BoundMethod {
    pub receiver: Value,
    pub kind: MethodKind,
}

#[derive(Debug)]
pub(crate) enum MethodKind {
    /// A function found on a user class.
    User(Rc<Function>),
    /// A method implemented natively for a builtin type or the session context.
    Builtin(&'static str),
}

/// Iterator state for `for` loops and every builtin that consumes an iterable.
pub(crate) enum ValueIter {
    /// Lists are iterated live: items appended during iteration are visited.
    List {
        list: Rc<RefCell<Vec<Value>>>,
        index: usize,
    },
    Range {
        next: i64,
        stop: i64,
        step: i64,
    },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Self::List { list, index } => {
                let item = list.borrow().get(*index).cloned();
                *index += 1;
                item
            }
            Self::Range { next, stop, step } => {
                let done = if *step > 0 { *next >= *stop } else { *next <= *stop };
                if done {
                    return None;
                }
                let value = *next;
                match next.checked_add(*step) {
                    Some(following) => *next = following,
                    None => *next = *stop,
                }
                Some(Value::Int(value))
            }
            Self::Items(items) => items.next(),
        }
    }
}

fn write_infallible(out: &mut String, args: fmt::Arguments<'_>) {
    // writing into a String cannot fail
    let _ = out.write_fmt(args);
}

fn write_sequence(
    items: &[Value],
    out: &mut String,
    seen: &mut Vec<usize>,
    instance_repr: &mut dyn FnMut(&Rc<Instance>) -> RunResult<Option<String>>,
) -> RunResult<()> {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, seen, instance_repr)?;
    }
    Ok(())
}

fn sequences_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

fn sequences_cmp(a: &[Value], b: &[Value]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return x.py_cmp(y);
        }
    }
    Some(a.len().cmp(&b.len()))
}

/// Python's float repr: shortest round-tripping digits, `e+NN` / `e-NN` exponents.
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f.is_sign_negative() { "-inf" } else { "inf" }.to_owned();
    }
    let mut buffer = ryu::Buffer::new();
    let s = buffer.format_finite(f);
    match s.find('e') {
        Some(e_pos) => {
            let (mantissa, exp_part) = s.split_at(e_pos);
            let exp = &exp_part[1..];
            let mantissa = mantissa.strip_suffix(".0").unwrap_or(mantissa);
            match exp.strip_prefix('-') {
                Some(digits) => format!("{mantissa}e-{digits:0>2}"),
                None => format!("{mantissa}e+{exp:0>2}"),
            }
        }
        None if s.contains('.') => s.to_owned(),
        None => format!("{s}.0"),
    }
}

/// Python's str repr: single quotes unless the text contains `'` and no `"`.
pub(crate) fn string_repr_fmt(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if u32::from(c) < 0x20 || u32::from(c) == 0x7f => {
                write_infallible(out, format_args!("\\x{:02x}", u32::from(c)));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}
