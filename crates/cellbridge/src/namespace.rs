use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{Introspectable, Value};

/// The persistent global scope of a session.
///
/// Insertion ordered so `dir()` and completion see names in a stable order before sorting.
/// Owned by exactly one [`Session`](crate::Session) and mutated in place by every batch.
#[derive(Debug, Default)]
pub struct Namespace(IndexMap<Rc<str>, Value>);

impl Namespace {
    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub(crate) fn set(&mut self, name: Rc<str>, value: Value) {
        self.0.insert(name, value);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Bound names in binding order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|name| &**name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The namespace's attributes are its bound names.
impl Introspectable for Namespace {
    fn attribute_names(&self) -> Vec<String> {
        self.names().map(str::to_owned).collect()
    }
}
