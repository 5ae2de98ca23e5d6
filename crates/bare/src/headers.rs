//! Header collections.
//!
//! Two collections exist because the protocol has two header layers:
//!
//! - [`BareHeaders`]: the *logical* headers of the proxied request or
//!   response. Ordered, case-preserving (early servers are sensitive to
//!   capitalisation), and serialised as a JSON object whose values are either a
//!   string or an array of strings.
//! - [`HeaderList`]: the *transport* headers exchanged with the intermediary.
//!   Ordered, names folded to lowercase, repeated names allowed.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Logical headers
// ---------------------------------------------------------------------------

/// Value of one logical header: a single string or a list (e.g. `set-cookie`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BareHeaderValue {
    /// A single header value.
    Single(String),
    /// Several values for the same header name.
    Multiple(Vec<String>),
}

impl BareHeaderValue {
    /// Returns the first value.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(v) => Some(v),
            Self::Multiple(values) => values.first().map(String::as_str),
        }
    }

    /// Returns every value in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => vec![v.as_str()],
            Self::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for BareHeaderValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for BareHeaderValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for BareHeaderValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

/// Ordered, case-preserving logical header map.
///
/// Name lookups are case-insensitive; the stored spelling is the one first
/// inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BareHeaders {
    entries: Vec<(String, BareHeaderValue)>,
}

impl BareHeaders {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no headers are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Returns the value stored under `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&BareHeaderValue> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    /// Returns the first value stored under `name`, ignoring case.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(BareHeaderValue::first)
    }

    /// Returns `true` if `name` is present, ignoring case.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Sets `name` to `value`.
    ///
    /// An existing entry matching `name` case-insensitively keeps its position
    /// and original spelling; otherwise the entry is appended as spelled.
    pub fn set(&mut self, name: &str, value: impl Into<BareHeaderValue>) {
        let value = value.into();
        match self.position(name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Appends a value, turning an existing single value into a list.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(i) => {
                let slot = &mut self.entries[i].1;
                *slot = match std::mem::replace(slot, BareHeaderValue::Multiple(Vec::new())) {
                    BareHeaderValue::Single(prev) => BareHeaderValue::Multiple(vec![prev, value]),
                    BareHeaderValue::Multiple(mut values) => {
                        values.push(value);
                        BareHeaderValue::Multiple(values)
                    }
                };
            }
            None => self.entries.push((name.to_string(), BareHeaderValue::Single(value))),
        }
    }

    /// Removes `name`, ignoring case, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<BareHeaderValue> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BareHeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<BareHeaderValue>> FromIterator<(K, V)> for BareHeaders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.set(&name.into(), value);
        }
        headers
    }
}

impl Serialize for BareHeaders {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BareHeaders {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = BareHeaders;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of header names to strings or string arrays")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                // Keep duplicate keys verbatim; the wire JSON is authoritative.
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, BareHeaderValue>()? {
                    entries.push((name, value));
                }
                Ok(BareHeaders { entries })
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

// ---------------------------------------------------------------------------
// Transport headers
// ---------------------------------------------------------------------------

/// Ordered transport header list with lowercase names and repeated fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    fields: Vec<(String, String)>,
}

impl HeaderList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of fields, counting repeats.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the list has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Appends a field, keeping earlier fields with the same name.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push((name.to_ascii_lowercase(), value.into()));
    }

    /// Replaces every field named `name` with a single field.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.append(name, value);
    }

    /// Returns the first value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value of `name` in receipt order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if at least one field is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes every field named `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.fields.len()
    }

    /// Keeps only the fields for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.fields.retain(|(n, v)| keep(n, v));
    }

    /// Iterates fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut list = Self::new();
        for (name, value) in iter {
            list.append(name.as_ref(), value);
        }
        list
    }
}
