//! Multi-valued header map with case-insensitive names.
//!
//! Insertion order is preserved so that handshake and HTTP requests emit
//! headers in the order they were configured. Every mutation replaces the
//! whole value list for a name; there is no implicit append.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Standard `Authorization` header name.
pub const AUTHORIZATION: &str = "Authorization";

/// Ordered, case-insensitive, multi-valued header map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    /// Empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// All values for `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    /// First value for `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// Whether a header named `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Replace every value for `name` with `values`.
    ///
    /// An existing entry keeps its position (and its original spelling);
    /// a new one is appended.
    pub fn set<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = values,
            None => self.entries.push((name, values)),
        }
    }

    /// Replace every value for `name` with a single value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(name, [value.into()]);
    }

    /// Remove `name`, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Builder form of [`Headers::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Apply `overrides` on top of `self`.
    ///
    /// Per header name: an override with an empty value list removes the
    /// header, a non-empty list replaces the base entry entirely, and names
    /// absent from the overrides are inherited unchanged.
    #[must_use]
    pub fn merged_with(&self, overrides: &Headers) -> Headers {
        let mut merged = self.clone();
        for (name, values) in &overrides.entries {
            if values.is_empty() {
                let _ = merged.remove(name);
            } else {
                merged.set(name.clone(), values.iter().cloned());
            }
        }
        merged
    }

    /// Iterate `(name, values)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Iterate every `(name, value)` pair, one per value.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(n, vs)| vs.iter().map(move |v| (n.as_str(), v.as_str())))
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            let k = k.into();
            let v = v.into();
            match headers.position(&k) {
                Some(i) => headers.entries[i].1.push(v),
                None => headers.entries.push((k, vec![v])),
            }
        }
        headers
    }
}

// ── Serde ───────────────────────────────────────────────────────────────────

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// A configured header value: a single string or a list of strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

struct HeadersVisitor;

impl<'de> Visitor<'de> for HeadersVisitor {
    type Value = Headers;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of header names to a string or list of strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
        let mut headers = Headers::new();
        while let Some((name, values)) = access.next_entry::<String, HeaderValues>()? {
            match values {
                HeaderValues::One(v) => headers.set(name, [v]),
                HeaderValues::Many(vs) => headers.set(name, vs),
            }
        }
        Ok(headers)
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(HeadersVisitor)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Headers {
        let mut h = Headers::new();
        h.set("A", ["1"]);
        h.set("B", ["x", "y"]);
        h
    }

    // ── lookup ──────────────────────────────────────────────────────

    #[test]
    fn names_are_case_insensitive() {
        let h = Headers::new().with("Content-Type", "text/plain");
        assert_eq!(h.first("content-type"), Some("text/plain"));
        assert!(h.contains("CONTENT-TYPE"));
    }

    #[test]
    fn set_replaces_instead_of_appending() {
        let mut h = Headers::new().with(AUTHORIZATION, "Basic old");
        h.insert("authorization", "Bearer new");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(AUTHORIZATION).unwrap(), ["Bearer new".to_string()]);
    }

    #[test]
    fn set_keeps_original_position() {
        let mut h = base();
        h.set("a", ["2"]);
        let names: Vec<&str> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["A", "B"]);
    }

    #[test]
    fn from_iter_groups_repeated_names() {
        let h: Headers = [("X", "1"), ("x", "2"), ("Y", "3")].into_iter().collect();
        assert_eq!(h.get("X").unwrap().len(), 2);
        assert_eq!(h.pairs().count(), 3);
    }

    // ── merged_with ─────────────────────────────────────────────────

    #[test]
    fn empty_override_removes_header() {
        let mut overrides = Headers::new();
        overrides.set("A", Vec::<String>::new());
        let merged = base().merged_with(&overrides);
        assert!(!merged.contains("A"));
        assert!(merged.contains("B"));
    }

    #[test]
    fn non_empty_override_replaces_entirely() {
        let mut overrides = Headers::new();
        overrides.set("a", ["2"]);
        let merged = base().merged_with(&overrides);
        assert_eq!(merged.get("A").unwrap(), ["2".to_string()]);
    }

    #[test]
    fn absent_headers_are_inherited() {
        let overrides = Headers::new().with("C", "3");
        let merged = base().merged_with(&overrides);
        assert_eq!(merged.get("B").unwrap(), ["x".to_string(), "y".to_string()]);
        assert_eq!(merged.first("C"), Some("3"));
    }

    #[test]
    fn removing_missing_header_is_harmless() {
        let mut overrides = Headers::new();
        overrides.set("Missing", Vec::<String>::new());
        assert_eq!(base().merged_with(&overrides), base());
    }

    // ── serde ───────────────────────────────────────────────────────

    #[test]
    fn deserializes_string_or_list_values() {
        let h: Headers =
            serde_json::from_str(r#"{"X-One": "1", "X-Many": ["a", "b"], "X-None": []}"#).unwrap();
        assert_eq!(h.first("x-one"), Some("1"));
        assert_eq!(h.get("x-many").unwrap().len(), 2);
        assert!(h.get("x-none").unwrap().is_empty());
    }

    #[test]
    fn serializes_as_map_of_lists() {
        let json = serde_json::to_value(base()).unwrap();
        assert_eq!(json, serde_json::json!({"A": ["1"], "B": ["x", "y"]}));
    }
}
