//! The session context object: a dict-like proxy to the host's shared-variable store plus
//! the host's input widgets.

use crate::{
    args::ArgValues,
    exception::{ExcType, Exception, RunResult},
    host::{HostFault, HostValue, ParamOption},
    interp::Interp,
    value::Value,
};

/// Methods callable on the session context, sorted.
pub(crate) const CONTEXT_METHODS: [&str; 9] = [
    "add", "checkbox", "contains", "get", "input", "put", "remove", "select", "show",
];

impl Interp<'_> {
    pub(crate) fn call_context_method(&mut self, name: &str, mut args: ArgValues) -> RunResult<Value> {
        match name {
            "get" => {
                let key = args.get_one_arg("get")?;
                self.context_get(&key)
            }
            "put" | "add" => {
                let (key, value) = args.get_two_args(name)?;
                self.context_put(&key, &value)?;
                Ok(Value::None)
            }
            "remove" => {
                let key = args.get_one_arg("remove")?;
                self.context_remove(&key)?;
                Ok(Value::None)
            }
            "contains" => {
                let key = args.get_one_arg("contains")?;
                self.context_contains(&key).map(Value::Bool)
            }
            "input" => {
                let default = args.take_kwarg("default");
                let (name, positional_default) = args.get_one_two_args("input")?;
                let name = widget_name(&name)?;
                let default = positional_default.or(default).unwrap_or_else(|| Value::from("")).to_host()?;
                let value = self
                    .host
                    .input(&name, &default)
                    .map_err(|fault| self.host_error("input", &fault))?;
                Ok(Value::from_host(&value))
            }
            "select" => {
                let default = args.take_kwarg("default");
                args.check_no_kwargs("select")?;
                let mut positional = std::mem::take(&mut args.positional).into_iter();
                let (Some(name), Some(options), positional_default, None) =
                    (positional.next(), positional.next(), positional.next(), positional.next())
                else {
                    return Err(ExcType::type_error("select() takes a name, options and an optional default"));
                };
                let name = widget_name(&name)?;
                let options = self.param_options(&options)?;
                let default = positional_default.or(default).unwrap_or_else(|| Value::from("")).to_host()?;
                let value = self
                    .host
                    .select(&name, &options, &default)
                    .map_err(|fault| self.host_error("select", &fault))?;
                Ok(Value::from_host(&value))
            }
            "checkbox" => {
                let default_checked = args.take_kwarg("default_checked");
                args.check_no_kwargs("checkbox")?;
                let mut positional = std::mem::take(&mut args.positional).into_iter();
                let (Some(name), Some(options), positional_default, None) =
                    (positional.next(), positional.next(), positional.next(), positional.next())
                else {
                    return Err(ExcType::type_error(
                        "checkbox() takes a name, options and optional default_checked",
                    ));
                };
                let name = widget_name(&name)?;
                let options = self.param_options(&options)?;
                let default_checked = match positional_default.or(default_checked) {
                    None | Some(Value::None) => options.iter().map(|option| option.value.clone()).collect(),
                    Some(values) => values
                        .to_vec()?
                        .iter()
                        .map(Value::to_host)
                        .collect::<RunResult<Vec<HostValue>>>()?,
                };
                let checked = self
                    .host
                    .checkbox(&name, &options, &default_checked)
                    .map_err(|fault| self.host_error("checkbox", &fault))?;
                Ok(Value::new_list(checked.iter().map(Value::from_host).collect()))
            }
            "show" => {
                // rendering hints such as `width=` are accepted and ignored
                args.kwargs.clear();
                let value = args.get_one_arg("show")?;
                if is_callable(&value) {
                    self.call_value(&value, ArgValues::default())?;
                } else {
                    let text = self.to_str(&value)?;
                    self.write(&format!("{text}\n"))?;
                }
                Ok(Value::None)
            }
            other => Err(ExcType::attribute_error("SessionContext", other)),
        }
    }

    /// `z.get(key)` / `z[key]`; a missing key reads as `None`.
    pub(crate) fn context_get(&mut self, key: &Value) -> RunResult<Value> {
        let key = context_key(key)?;
        let value = self.host.get(&key).map_err(|fault| self.host_error("get", &fault))?;
        Ok(value.as_ref().map_or(Value::None, Value::from_host))
    }

    /// `z.put(key, value)` / `z[key] = value`.
    pub(crate) fn context_put(&mut self, key: &Value, value: &Value) -> RunResult<()> {
        let key = context_key(key)?;
        let value = value.to_host()?;
        self.host.put(&key, value).map_err(|fault| self.host_error("put", &fault))
    }

    /// `z.remove(key)` / `del z[key]`.
    pub(crate) fn context_remove(&mut self, key: &Value) -> RunResult<()> {
        let key = context_key(key)?;
        self.host.remove(&key).map_err(|fault| self.host_error("remove", &fault))
    }

    /// `z.contains(key)` / `key in z`.
    pub(crate) fn context_contains(&mut self, key: &Value) -> RunResult<bool> {
        let key = context_key(key)?;
        self.host
            .contains(&key)
            .map_err(|fault| self.host_error("contains", &fault))
    }

    /// Validates widget options: every option must be a `(value, label)` pair.
    fn param_options(&mut self, options: &Value) -> RunResult<Vec<ParamOption>> {
        let mut converted = Vec::new();
        for option in options.py_iter()? {
            let pair = match &option {
                Value::Tuple(_) | Value::List(_) => option.to_vec()?,
                _ => Vec::new(),
            };
            let [value, label] = <[Value; 2]>::try_from(pair)
                .map_err(|_| ExcType::index_error("options must be a list of tuple of 2"))?;
            converted.push(ParamOption {
                value: value.to_host()?,
                label: self.to_str(&label)?,
            });
        }
        Ok(converted)
    }

    /// Wraps a host failure the way a remote-call bridge reports it.
    fn host_error(&self, method: &str, fault: &HostFault) -> Exception {
        Exception::new_msg(
            ExcType::HostRuntimeError,
            format!(
                "An error occurred while calling {}.{method}.\n: {fault}",
                self.config.context_name
            ),
        )
    }
}

fn context_key(key: &Value) -> RunResult<String> {
    match key {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(ExcType::type_error(format!(
            "context keys must be str, not {}",
            other.type_name()
        ))),
    }
}

fn widget_name(name: &Value) -> RunResult<String> {
    match name {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(ExcType::type_error(format!(
            "form names must be str, not {}",
            other.type_name()
        ))),
    }
}

fn is_callable(value: &Value) -> bool {
    matches!(
        value,
        Value::Function(_) | Value::Builtin(_) | Value::Method(_) | Value::Class(_)
    ) || matches!(value, Value::Instance(instance) if instance.class.lookup("__call__").is_some())
}
