//! Header and response representations that don't depend on any one HTTP
//! client/server framework.

use serde::{Deserialize, Serialize};

/// An ordered, duplicate-preserving list of header name/value pairs.
///
/// A `HashMap` loses repeated headers (`Set-Cookie` most notably); this
/// keeps every occurrence, in the order seen, while still offering
/// case-insensitive lookup by normalizing names to lowercase on insert, per
/// RFC 7230 §3.2.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedHeaders(Vec<(String, String)>);

impl OrderedHeaders {
    /// An empty header list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header, preserving any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into().to_ascii_lowercase(), value.into()));
    }

    /// Replace all occurrences of `name` with a single entry.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        self.0.retain(|(k, _)| k != &name);
        self.0.push((name, value.into()));
    }

    /// Remove every occurrence of `name`.
    pub fn remove(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        self.0.retain(|(k, _)| k != &name);
    }

    /// The first value stored for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.0.iter().find(|(k, _)| k == &name).map(|(_, v)| v.as_str())
    }

    /// All values stored for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        let name = name.to_ascii_lowercase();
        self.0.iter().filter(move |(k, _)| *k == name).map(|(_, v)| v.as_str())
    }

    /// Whether any entry has this name.
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate all (name, value) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a OrderedHeaders {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// A response captured for storage in the cache.
///
/// Mirrors the shape the original implementation serializes
/// (`content`/`status_code`/`headers`), translated into typed fields
/// instead of an untyped mapping; [`CacheError::Malformed`](crate::error::CacheError::Malformed)
/// takes the place of the original's `TypeError` on a malformed shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedResponse {
    /// Raw response body bytes.
    pub body: Vec<u8>,
    /// HTTP status code.
    pub status: u16,
    /// Response headers, in the order the response produced them.
    pub headers: OrderedHeaders,
}

impl SerializedResponse {
    /// Construct a new serialized response.
    pub fn new(status: u16, headers: OrderedHeaders, body: Vec<u8>) -> Self {
        Self { body, status, headers }
    }

    /// Parse previously-stored bytes back into a [`SerializedResponse`],
    /// surfacing a [`CacheError::Malformed`](crate::error::CacheError::Malformed)
    /// if the stored shape doesn't match (corrupted or foreign entry).
    pub fn from_stored(bytes: &[u8]) -> crate::error::Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| crate::error::CacheError::Malformed(e.to_string()))
    }

    /// Serialize for storage.
    pub fn to_stored(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
