use std::rc::Rc;

use crate::{
    exception::{ExcType, RunResult},
    value::Value,
};

/// Evaluated arguments of a call.
#[derive(Debug, Default)]
pub(crate) struct ArgValues {
    pub positional: Vec<Value>,
    pub kwargs: Vec<(Rc<str>, Value)>,
}

impl ArgValues {
    pub fn positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            kwargs: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.positional.len() + self.kwargs.len()
    }

    /// Removes and returns a keyword argument by name.
    pub fn take_kwarg(&mut self, name: &str) -> Option<Value> {
        let index = self.kwargs.iter().position(|(key, _)| &**key == name)?;
        Some(self.kwargs.remove(index).1)
    }

    /// Fails if any keyword argument is left over.
    pub fn check_no_kwargs(&self, name: &str) -> RunResult<()> {
        match self.kwargs.first() {
            Some((key, _)) => Err(ExcType::type_error_unexpected_keyword(name, key)),
            None => Ok(()),
        }
    }

    /// Checks that zero arguments were passed.
    pub fn check_zero_args(self, name: &str) -> RunResult<()> {
        self.check_no_kwargs(name)?;
        match self.positional.len() {
            0 => Ok(()),
            count => Err(ExcType::type_error_no_args(name, count)),
        }
    }

    /// Checks that exactly one positional argument was passed, returning it.
    pub fn get_one_arg(self, name: &str) -> RunResult<Value> {
        self.check_no_kwargs(name)?;
        let count = self.positional.len();
        let mut iter = self.positional.into_iter();
        match (iter.next(), iter.next()) {
            (Some(a), None) => Ok(a),
            _ => Err(ExcType::type_error_arg_count(name, 1, count)),
        }
    }

    /// Checks that exactly two positional arguments were passed, returning them as a tuple.
    pub fn get_two_args(self, name: &str) -> RunResult<(Value, Value)> {
        self.check_no_kwargs(name)?;
        let count = self.positional.len();
        let mut iter = self.positional.into_iter();
        match (iter.next(), iter.next(), iter.next()) {
            (Some(a), Some(b), None) => Ok((a, b)),
            _ => Err(ExcType::type_error_arg_count(name, 2, count)),
        }
    }

    /// Checks that zero or one positional argument was passed.
    pub fn get_zero_one_arg(self, name: &str) -> RunResult<Option<Value>> {
        self.check_no_kwargs(name)?;
        let count = self.positional.len();
        let mut iter = self.positional.into_iter();
        match (iter.next(), iter.next()) {
            (a, None) => Ok(a),
            _ => Err(ExcType::type_error_at_most(name, 1, count)),
        }
    }

    /// Checks that one or two positional arguments were passed.
    pub fn get_one_two_args(self, name: &str) -> RunResult<(Value, Option<Value>)> {
        self.check_no_kwargs(name)?;
        let count = self.positional.len();
        let mut iter = self.positional.into_iter();
        match (iter.next(), iter.next(), iter.next()) {
            (Some(a), b, None) => Ok((a, b)),
            (None, _, _) => Err(ExcType::type_error_at_least(name, 1, count)),
            _ => Err(ExcType::type_error_at_most(name, 2, count)),
        }
    }

    /// Checks that one to three positional arguments were passed.
    pub fn get_one_to_three_args(self, name: &str) -> RunResult<(Value, Option<Value>, Option<Value>)> {
        self.check_no_kwargs(name)?;
        let count = self.positional.len();
        let mut iter = self.positional.into_iter();
        match (iter.next(), iter.next(), iter.next(), iter.next()) {
            (Some(a), b, c, None) => Ok((a, b, c)),
            (None, ..) => Err(ExcType::type_error_at_least(name, 1, count)),
            _ => Err(ExcType::type_error_at_most(name, 3, count)),
        }
    }
}
