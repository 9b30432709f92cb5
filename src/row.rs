use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One row produced by the pipeline. The shape depends on configuration, never on data.
#[derive(Debug, PartialEq)]
pub enum Row {
    Fields(Vec<String>),
    Record(Record),
    Object(Object),
}

impl Row {
    pub fn as_fields(&self) -> Option<&[String]> {
        match self {
            Row::Fields(fields) => Some(fields.as_slice()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Row::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Row::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Field lookup by header key for keyed rows.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            Row::Fields(_) => None,
            Row::Record(record) => record.get(key),
            Row::Object(Object::Generic(record)) => record.get(key),
            Row::Object(Object::Custom(_)) => None,
        }
    }
}

impl<S: Into<String>> From<Vec<S>> for Row {
    fn from(fields: Vec<S>) -> Self {
        Row::Fields(fields.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Row {
    fn from(fields: [S; N]) -> Self {
        Row::Fields(fields.into_iter().map(Into::into).collect())
    }
}

impl From<Record> for Row {
    fn from(record: Record) -> Self {
        Row::Record(record)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Row::Fields(fields) => fields.serialize(serializer),
            Row::Record(record) => record.serialize(serializer),
            Row::Object(Object::Generic(record)) => record.serialize(serializer),
            Row::Object(Object::Custom(object)) => object
                .to_json()
                .map_err(S::Error::custom)?
                .serialize(serializer),
        }
    }
}

/// Header-keyed fields, kept in header order.
///
/// Inserting a key that already exists replaces its value in place, so duplicate
/// header labels keep the first position and the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    entries: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs `keys` with `values` positionally. Callers check the lengths.
    pub fn zip(keys: &[String], values: Vec<String>) -> Self {
        let mut record = Record {
            entries: Vec::with_capacity(keys.len()),
        };
        for (key, value) in keys.iter().zip(values) {
            record.insert(key.clone(), value);
        }
        record
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fields ordered by `headers` first, then the remaining entries in their own order.
    /// Headers without an entry become empty fields.
    pub fn aligned_to(&self, headers: &[String]) -> Vec<String> {
        let mut out: Vec<String> = headers
            .iter()
            .map(|h| self.get(h).unwrap_or_default().to_string())
            .collect();
        out.extend(
            self.entries
                .iter()
                .filter(|(k, _)| !headers.contains(k))
                .map(|(_, v)| v.clone()),
        );
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Upcast helper so trait objects can be downcast to their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A caller-defined type rows can be materialized into.
///
/// ```
/// use csv_rows::CsvObject;
///
/// #[derive(Debug, Default, serde::Serialize)]
/// struct Product {
///     sku: String,
///     price: String,
/// }
///
/// impl CsvObject for Product {
///     fn set_attribute(&mut self, name: &str, value: &str) -> bool {
///         match name {
///             "sku" => self.sku = value.to_string(),
///             "price" => self.price = value.to_string(),
///             _ => return false,
///         }
///         true
///     }
///
///     fn to_json(&self) -> serde_json::Result<serde_json::Value> {
///         serde_json::to_value(self)
///     }
/// }
/// ```
pub trait CsvObject: AsAny + fmt::Debug + Send + Sync + 'static {
    /// Assigns `value` to the attribute `name`. Returns false when there is no such attribute.
    fn set_attribute(&mut self, name: &str, value: &str) -> bool;

    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

/// A materialized row object.
#[derive(Debug)]
pub enum Object {
    /// Open-ended object with one attribute per (normalized) header.
    Generic(Record),
    Custom(Box<dyn CsvObject>),
}

impl Object {
    pub fn downcast_ref<T: CsvObject>(&self) -> Option<&T> {
        match self {
            Object::Custom(object) => (**object).as_any().downcast_ref::<T>(),
            Object::Generic(_) => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            Object::Generic(record) => record.get(name),
            Object::Custom(_) => None,
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Generic(a), Object::Generic(b)) => a == b,
            (Object::Custom(a), Object::Custom(b)) => match (a.to_json(), b.to_json()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }
}

type Factory = Arc<dyn Fn() -> Box<dyn CsvObject> + Send + Sync>;

/// Named factories for custom row objects.
#[derive(Clone, Default)]
pub struct ObjectTypes {
    factories: HashMap<String, Factory>,
}

impl ObjectTypes {
    pub fn register<T: CsvObject + Default>(&mut self, name: impl Into<String>) {
        self.factories
            .insert(name.into(), Arc::new(|| Box::new(T::default()) as Box<dyn CsvObject>));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds an object for `record`. Unknown or absent type names give a generic object.
    pub fn materialize(&self, type_name: Option<&str>, record: Record) -> Object {
        let Some(factory) = type_name.and_then(|name| self.factories.get(name)) else {
            if let Some(name) = type_name {
                tracing::trace!(type_name = name, "unknown object type, using generic object");
            }
            return Object::Generic(record);
        };

        let mut object = factory();
        for (key, value) in record.iter() {
            // Entries without a matching attribute are dropped.
            object.set_attribute(key, value);
        }
        Object::Custom(object)
    }
}

impl fmt::Debug for ObjectTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_overwrite_in_place() {
        let keys: Vec<String> = ["a", "b", "a"].map(String::from).to_vec();
        let record = Record::zip(&keys, vec!["1".into(), "2".into(), "3".into()]);
        assert_eq!(record.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(record.get("a"), Some("3"));
    }

    #[test]
    fn alignment_puts_headers_first() {
        let record: Record = [("Col2", "Bar"), ("Extra", "X"), ("Col1", "Foo")]
            .into_iter()
            .collect();
        let headers: Vec<String> = ["Col1", "Col2", "Col3"].map(String::from).to_vec();
        assert_eq!(record.aligned_to(&headers), ["Foo", "Bar", "", "X"]);
    }

    #[test]
    fn record_serializes_in_order() {
        let record: Record = [("b", "1"), ("a", "2")].into_iter().collect();
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"b":"1","a":"2"}"#);
    }
}
