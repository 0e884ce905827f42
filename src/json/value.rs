//! Purpose: In-memory JSON tree produced by the parser and consumed by the serializer.
//! Exports: `Value`, `Mapping`, `Sequence`, `ObjectKind`.
//! Role: Bound containers carry the protocol type they were instantiated as.
//! Invariants: Mapping keys are unique; iteration follows first-insertion order.
//! Invariants: Typed getters never coerce; a wrong shape is a `Validation` error naming the key.
//! Notes: Equality compares data only (kinds are ignored, integers equal same-valued decimals).
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::core::error::{Error, ErrorKind};

/// Concrete protocol type of a mapping (or of a sequence's elements).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ObjectKind {
    Generic,
    Catalog,
    Service,
    ServiceMetadata,
    DashboardClient,
    Plan,
    PlanMetadata,
    MaintenanceInfo,
    Schemas,
    ServiceInstanceSchema,
    ServiceBindingSchema,
    Schema,
    SchemaParameters,
    ProvisionRequest,
    UpdateRequest,
    BindRequest,
    Context,
    CloudFoundryContext,
    KubernetesContext,
    Parameters,
    PreviousValues,
    BindResource,
    ProvisionResponse,
    UpdateResponse,
    DeprovisionResponse,
    FetchInstanceResponse,
    LastOperation,
    BindResponse,
    FetchBindingResponse,
    UnbindResponse,
    BindingCredentials,
    VolumeMount,
    Device,
}

impl ObjectKind {
    pub fn is_generic(self) -> bool {
        self == ObjectKind::Generic
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(BigDecimal),
    String(String),
    Object(Mapping),
    Array(Sequence),
}

impl Value {
    /// Finite floats become decimals; `NaN` and the infinities become `null`.
    pub fn from_f64(value: f64) -> Value {
        if !value.is_finite() {
            return Value::Null;
        }
        BigDecimal::from_str(&value.to_string()).map_or(Value::Null, Value::Decimal)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Value::Integer(value) => Some(BigDecimal::from(*value)),
            Value::Decimal(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Object(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Array(sequence) => Some(sequence),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Integer(a), Value::Decimal(b)) | (Value::Decimal(b), Value::Integer(a)) => {
                BigDecimal::from(*a) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::from_f64(value)
    }
}

impl From<BigDecimal> for Value {
    fn from(value: BigDecimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Mapping> for Value {
    fn from(value: Mapping) -> Self {
        Value::Object(value)
    }
}

impl From<Sequence> for Value {
    fn from(value: Sequence) -> Self {
        Value::Array(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

fn mismatch(key: &str, expected: &str, found: &Value) -> Error {
    Error::new(ErrorKind::Validation).with_message(format!(
        "field '{key}' must be {expected}, found {}",
        found.type_name()
    ))
}

/// Insertion-ordered string-keyed map tagged with its protocol kind.
#[derive(Clone, Debug)]
pub struct Mapping {
    kind: ObjectKind,
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Mapping {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn generic() -> Self {
        Self::new(ObjectKind::Generic)
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Re-tags the mapping, keeping its entries.
    pub fn into_kind(mut self, kind: ObjectKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self.index.get(key) {
            Some(&slot) => Some(&mut self.entries[slot].1),
            None => None,
        }
    }

    /// Inserts or replaces; a replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(&slot) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[slot].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let slot = self.index.remove(key)?;
        let (_, value) = self.entries.remove(slot);
        for position in self.index.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Present, a string, and not empty.
    pub fn has_text(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::String(value)) if !value.is_empty())
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, Error> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "a string", other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, Error> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(key, "a boolean", other)),
        }
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, Error> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(key, "an integer", other)),
        }
    }

    pub fn get_decimal(&self, key: &str) -> Result<Option<BigDecimal>, Error> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_decimal()
                .map(Some)
                .ok_or_else(|| mismatch(key, "a number", value)),
        }
    }

    /// Any nested object, regardless of its kind.
    pub fn get_mapping(&self, key: &str) -> Result<Option<&Mapping>, Error> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(mapping)) => Ok(Some(mapping)),
            Some(other) => Err(mismatch(key, "an object", other)),
        }
    }

    /// A nested object that must be exactly `kind`.
    pub fn get_bound(&self, key: &str, kind: ObjectKind) -> Result<Option<&Mapping>, Error> {
        match self.get_mapping(key)? {
            None => Ok(None),
            Some(mapping) if mapping.kind() == kind => Ok(Some(mapping)),
            Some(mapping) => Err(Error::new(ErrorKind::Validation).with_message(format!(
                "field '{key}' must be a {kind} object, found {}",
                mapping.kind()
            ))),
        }
    }

    pub fn get_sequence(&self, key: &str) -> Result<Option<&Sequence>, Error> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(sequence)) => Ok(Some(sequence)),
            Some(other) => Err(mismatch(key, "an array", other)),
        }
    }

    /// Every non-null element of the array at `key`, each required to be a `kind` object.
    pub fn get_bound_items(&self, key: &str, kind: ObjectKind) -> Result<Option<Vec<&Mapping>>, Error> {
        let Some(sequence) = self.get_sequence(key)? else {
            return Ok(None);
        };
        let mut items = Vec::with_capacity(sequence.len());
        for (index, item) in sequence.iter().enumerate() {
            match item {
                Value::Null => {}
                Value::Object(mapping) if mapping.kind() == kind => items.push(mapping),
                other => {
                    return Err(Error::new(ErrorKind::Validation).with_message(format!(
                        "element {index} of '{key}' must be a {kind} object, found {}",
                        other.type_name()
                    )));
                }
            }
        }
        Ok(Some(items))
    }

    pub fn get_str_items(&self, key: &str) -> Result<Option<Vec<&str>>, Error> {
        let Some(sequence) = self.get_sequence(key)? else {
            return Ok(None);
        };
        let mut items = Vec::with_capacity(sequence.len());
        for item in sequence.iter() {
            match item {
                Value::String(value) => items.push(value.as_str()),
                other => return Err(mismatch(key, "an array of strings", other)),
            }
        }
        Ok(Some(items))
    }
}

impl Default for Mapping {
    fn default() -> Self {
        Self::generic()
    }
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|theirs| theirs == value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = Mapping::generic();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

/// Ordered values; `element` is the kind nested objects are bound to.
#[derive(Clone, Debug, Default)]
pub struct Sequence {
    element: Option<ObjectKind>,
    items: Vec<Value>,
}

impl Sequence {
    pub fn new(element: Option<ObjectKind>) -> Self {
        Self {
            element,
            items: Vec::new(),
        }
    }

    pub fn generic() -> Self {
        Self::new(None)
    }

    pub fn typed(element: ObjectKind, items: impl IntoIterator<Item = Mapping>) -> Self {
        Self {
            element: Some(element),
            items: items.into_iter().map(Value::Object).collect(),
        }
    }

    pub fn element(&self) -> Option<ObjectKind> {
        self.element
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<V: Into<Value>> FromIterator<V> for Sequence {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            element: None,
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}
