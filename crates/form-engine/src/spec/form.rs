use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::spec::field::Field;

/// Field list of a form or sub-form.
///
/// A keyed set iterates in sorted key order, not in authoring order. Use the
/// ordered form whenever render order matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldSet {
    Ordered(Vec<Option<Field>>),
    Keyed(BTreeMap<String, Option<Field>>),
}

impl Default for FieldSet {
    fn default() -> Self {
        FieldSet::Ordered(Vec::new())
    }
}

impl From<Vec<Field>> for FieldSet {
    fn from(fields: Vec<Field>) -> Self {
        FieldSet::Ordered(fields.into_iter().map(Some).collect())
    }
}

impl FieldSet {
    /// Iterates the present fields, skipping `null` entries.
    pub fn iter(&self) -> impl Iterator<Item = &Field> + '_ {
        let (ordered, keyed) = match self {
            FieldSet::Ordered(fields) => (Some(fields.iter().flatten()), None),
            FieldSet::Keyed(fields) => (None, Some(fields.values().flatten())),
        };
        ordered
            .into_iter()
            .flatten()
            .chain(keyed.into_iter().flatten())
    }

    pub fn iter_mut(&mut self) -> Box<dyn Iterator<Item = &mut Field> + '_> {
        match self {
            FieldSet::Ordered(fields) => Box::new(fields.iter_mut().flatten()),
            FieldSet::Keyed(fields) => Box::new(fields.values_mut().flatten()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.iter().find(|field| field.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.iter_mut().find(|field| field.name == name)
    }

    /// Appends a field; keyed sets store it under its name.
    pub fn push(&mut self, field: Field) {
        match self {
            FieldSet::Ordered(fields) => fields.push(Some(field)),
            FieldSet::Keyed(fields) => {
                fields.insert(field.name.clone(), Some(field));
            }
        }
    }

    /// Removes every field with the given name, returning the first one.
    pub fn remove(&mut self, name: &str) -> Option<Field> {
        match self {
            FieldSet::Ordered(fields) => {
                let index = fields
                    .iter()
                    .position(|field| field.as_ref().is_some_and(|field| field.name == name))?;
                fields.remove(index)
            }
            FieldSet::Keyed(fields) => {
                let key = fields
                    .iter()
                    .find(|(_, field)| field.as_ref().is_some_and(|field| field.name == name))
                    .map(|(key, _)| key.clone())?;
                fields.remove(&key).flatten()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Top-level form definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `null` reads as an empty form.
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schemars(with = "Option<FieldSet>")]
    pub fields: FieldSet,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<FieldSet, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<FieldSet>::deserialize(deserializer)?.unwrap_or_default())
}

impl Form {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields: fields.into(),
            ..Self::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    /// Looks a field up through nested sub-form field lists.
    pub fn field_at(&self, path: &[&str]) -> Option<&Field> {
        let (last, parents) = path.split_last()?;
        let mut fields = &self.fields;
        for name in parents {
            fields = fields.get(name)?.fields.as_ref()?;
        }
        fields.get(last)
    }

    pub fn field_at_mut(&mut self, path: &[&str]) -> Option<&mut Field> {
        let (last, parents) = path.split_last()?;
        let mut fields = &mut self.fields;
        for name in parents {
            fields = fields.get_mut(name)?.fields.as_mut()?;
        }
        fields.get_mut(last)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
