//! Multi-valued string tags attached to every registration.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// An ordered multimap of string keys to value lists.
///
/// Holds the query parameters a client supplied at registration time and
/// the headers it presented during the upgrade handshake. Introspection
/// endpoints filter records by subset-matching against these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, Vec<String>>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an URL-encoded query string (`a=1&a=2&b=x`).
    pub fn from_query(query: &str) -> Self {
        let mut tags = Self::new();
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            tags.append(&k, &v);
        }
        tags
    }

    /// Collect header names and values, lower-casing the names.
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let mut tags = Self::new();
        for (name, value) in headers {
            if let Ok(v) = value.to_str() {
                tags.append(name.as_str(), v);
            }
        }
        tags
    }

    pub fn append(&mut self, key: &str, value: &str) {
        self.0
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// First value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|vs| vs.first()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every wanted key is present here with the wanted values as
    /// a subset of the stored ones.
    pub fn matches(&self, wanted: &Tags) -> bool {
        wanted.0.iter().all(|(k, vs)| match self.0.get(k) {
            Some(have) => vs.iter().all(|v| have.contains(v)),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query() {
        let tags = Tags::from_query("a=1&a=2&clobber=secret");
        assert_eq!(tags.get("a"), Some("1"));
        assert_eq!(tags.get("clobber"), Some("secret"));
        assert_eq!(tags.get("missing"), None);
    }

    #[test]
    fn test_subset_matching() {
        let stored = Tags::from_query("env=prod&env=eu&team=infra");

        assert!(stored.matches(&Tags::new()));
        assert!(stored.matches(&Tags::from_query("env=prod")));
        assert!(stored.matches(&Tags::from_query("env=prod&env=eu")));
        assert!(stored.matches(&Tags::from_query("env=eu&team=infra")));

        assert!(!stored.matches(&Tags::from_query("env=dev")));
        assert!(!stored.matches(&Tags::from_query("owner=me")));
        assert!(!stored.matches(&Tags::from_query("env=prod&env=us")));
    }

    #[test]
    fn test_empty_query_value() {
        let tags = Tags::from_query("clobber=");
        assert_eq!(tags.get("clobber"), Some(""));
    }
}
