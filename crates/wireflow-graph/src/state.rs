use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use wireflow_core::error::{GraphError, Result};

/// State threaded through a graph run.
///
/// A run owns exactly one value of this type. Each node receives it by value
/// and returns the value the next step sees, so a snapshot handed out by the
/// executor can never be changed by a later node.
///
/// Typed records only need an empty impl: the compiler fixes their fields.
pub trait GraphState: Clone + Send + Sync + Serialize + 'static {
    /// Declared field names, for states that check their schema at run time.
    ///
    /// The executor compares this before and after every node and fails the
    /// run with `SchemaViolation` when they differ.
    fn schema(&self) -> Option<Vec<String>> {
        None
    }
}

/// Dynamic state: an ordered set of named JSON fields whose names are fixed
/// when the container is created.
///
/// Writes to undeclared fields are rejected, so a node can only change the
/// values of the fields the graph was defined with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateContainer {
    fields: Vec<(String, Value)>,
}

impl StateContainer {
    /// Declare fields, all starting as `null`.
    pub fn with_fields<I, K>(names: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::from_pairs(names.into_iter().map(|n| (n, Value::Null)))
    }

    /// Declare fields with initial values. A repeated name keeps its first
    /// position and its last value.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut fields: Vec<(String, Value)> = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            match fields.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value,
                None => fields.push((name, value)),
            }
        }
        Self { fields }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// Get a value as an integer, if it's one.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// Get a value as a bool, if it's one.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Set a declared field.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let slot = self.slot_mut(key)?;
        *slot = value;
        Ok(())
    }

    /// Set a declared field to a string.
    pub fn set_str(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.set(key, Value::String(value.into()))
    }

    /// Append to a declared list field. A `null` field becomes a one-item list.
    pub fn append(&mut self, key: &str, value: Value) -> Result<()> {
        let slot = self.slot_mut(key)?;
        match slot {
            Value::Array(items) => items.push(value),
            Value::Null => *slot = Value::Array(vec![value]),
            _ => {
                return Err(GraphError::FieldType {
                    field: key.to_string(),
                    expected: "list",
                    found: json_kind(slot),
                })
            }
        }
        Ok(())
    }

    /// Whether a field is declared.
    pub fn has_field(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// Declared field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn slot_mut(&mut self, key: &str) -> Result<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| GraphError::UndeclaredField(key.to_string()))
    }
}

impl GraphState for StateContainer {
    fn schema(&self) -> Option<Vec<String>> {
        Some(self.field_names().map(str::to_string).collect())
    }
}

macro_rules! plain_state {
    ($($ty:ty),*) => {
        $(impl GraphState for $ty {})*
    };
}

plain_state!(i32, i64, u32, u64, f64, bool, String, Value);

impl<T: Clone + Send + Sync + Serialize + 'static> GraphState for Vec<T> {}

impl Serialize for StateContainer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Describe how two schemas differ, for `SchemaViolation` messages.
pub(crate) fn schema_difference(expected: &[String], actual: &[String]) -> String {
    let added: Vec<&str> = actual
        .iter()
        .filter(|f| !expected.contains(f))
        .map(String::as_str)
        .collect();
    let missing: Vec<&str> = expected
        .iter()
        .filter(|f| !actual.contains(f))
        .map(String::as_str)
        .collect();

    let mut parts = Vec::new();
    if !added.is_empty() {
        parts.push(format!("undeclared fields [{}]", added.join(", ")));
    }
    if !missing.is_empty() {
        parts.push(format!("missing fields [{}]", missing.join(", ")));
    }
    if parts.is_empty() {
        "field order changed".to_string()
    } else {
        parts.join("; ")
    }
}

/// The part of `after` that differs from `before`.
///
/// For object-shaped states this is an object holding only the top-level
/// fields whose values changed. A field the node removed appears as `null`.
/// Any other shape yields the whole new value, or an empty object when
/// nothing changed.
pub(crate) fn state_delta(before: &Value, after: &Value) -> Value {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut delta: Map<String, Value> = a
                .iter()
                .filter(|(k, v)| b.get(k.as_str()) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for key in b.keys().filter(|k| !a.contains_key(k.as_str())) {
                delta.insert(key.clone(), Value::Null);
            }
            Value::Object(delta)
        }
        (b, a) if b == a => Value::Object(Map::new()),
        (_, a) => a.clone(),
    }
}
