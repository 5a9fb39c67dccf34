// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

use crate::row::DataType;

/// Descriptor of one field: name, declared type and an optional conversion
/// mask used when the field is rendered from or parsed into text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub format: Option<String>,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            format: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Ordered field descriptors describing the shape of every row in a stream.
///
/// Field names are unique within one schema; lookups ignore case. A schema is
/// cloned whenever it is attached to a new stream and is never mutated after
/// the stream's first row has been emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldMeta>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from field descriptors, rejecting duplicate names.
    pub fn from_fields(fields: Vec<FieldMeta>) -> Result<Self, String> {
        let mut schema = Self::new();
        for field in fields {
            schema.push(field)?;
        }
        Ok(schema)
    }

    /// Append a field. Fails when a field of the same name already exists.
    pub fn push(&mut self, field: FieldMeta) -> Result<(), String> {
        if self.index_of(&field.name).is_some() {
            return Err(format!("field '{}' already exists in schema", field.name));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Append a field, renaming it `<name><suffix>`, then `<name><suffix>2`
    /// and so on while the name is taken.
    pub fn push_renamed(&mut self, mut field: FieldMeta, suffix: &str) {
        let base = field.name.clone();
        let mut attempt = 1;
        while self.index_of(&field.name).is_some() {
            field.name = match attempt {
                1 => format!("{}{}", base, suffix),
                n => format!("{}{}{}", base, suffix, n),
            };
            attempt += 1;
        }
        self.fields.push(field);
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field(&self, index: usize) -> Option<&FieldMeta> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
