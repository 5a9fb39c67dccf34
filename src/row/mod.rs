// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Row and schema model.
//!
//! A [`Row`] is a positional sequence of [`Value`]s whose shape is described
//! by a [`Schema`]. Rows travel between stages together with the producer's
//! schema (see [`crate::engine::rowset`]).

pub mod convert;
mod schema;
mod value;

pub use convert::convert_text;
pub use schema::{FieldMeta, Schema};
pub use value::{DataType, Value};

/// Ordered sequence of typed values, addressed by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Replace the value at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, value: Value) -> Option<Value> {
        self.values
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value))
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut row = Row::new(vec![Value::Integer(1), Value::from("a")]);
        let previous = row.set(1, Value::from("b"));
        assert_eq!(previous, Some(Value::from("a")));
        assert_eq!(row.get(1), Some(&Value::from("b")));
        assert_eq!(row.set(5, Value::Null), None);
        assert_eq!(row.len(), 2);
    }
}
