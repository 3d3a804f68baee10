//! Cache key derivation: request fingerprints and the `Vary`-aware
//! varying-headers record.
//!
//! Grounded on `generate_cache_key`/`generate_varying_headers_cache_key`/
//! `learn_cache_key` in the original, which hash with MD5
//! (`usedforsecurity=False` — content-addressing, not a security
//! primitive) and key the store as
//! `{app_name}:cached:{method}.{url_hash}.{vary_hash}` /
//! `varying_headers.{url_hash}`.

use md5::{Digest, Md5};

use crate::headers::OrderedHeaders;

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// The record of which request headers a given path's responses vary by.
///
/// Grows monotonically: once a header is learned to matter for a path, it
/// stays in the record even if a later response's `Vary` omits it. Stored
/// under [`varying_headers_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaryingHeaders(pub Vec<String>);

impl VaryingHeaders {
    /// Merge a response's `Vary` header value into this record, producing
    /// the union, lowercased and sorted.
    ///
    /// Sorted, not first-seen order: matches
    /// `sorted(response_vary_headers | cached_vary_headers)` in the
    /// original exactly, which is also what makes the merge idempotent and
    /// order-independent regardless of which response is learned first.
    pub fn merge_vary_value(&self, vary_header_value: Option<&str>) -> Self {
        let mut set: std::collections::BTreeSet<String> =
            self.0.iter().cloned().collect();
        if let Some(value) = vary_header_value {
            for item in value.split(',') {
                let item = item.trim();
                if !item.is_empty() {
                    set.insert(item.to_ascii_lowercase());
                }
            }
        }
        VaryingHeaders(set.into_iter().collect())
    }

    /// Render as a `Vary` header value (comma-joined), or `None` if empty.
    pub fn as_header_value(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join(", "))
        }
    }
}

/// The key the [`VaryingHeaders`] record for a given URL path is stored
/// under.
pub fn varying_headers_key(path: &str) -> String {
    format!("varying_headers.{}", md5_hex(path))
}

/// The cache key for a (method, url, request headers) tuple, given the
/// `Vary`-learned header set for the URL's path.
///
/// Returns `None` if `method` is not one of the cachable methods
/// (`GET`/`HEAD`); the original returns `None` from `generate_cache_key`
/// for the same reason.
pub fn cache_key(
    app_name: &str,
    method: &str,
    url: &str,
    request_headers: &OrderedHeaders,
    varying_headers: &VaryingHeaders,
) -> Option<String> {
    if !crate::CACHABLE_METHODS.contains(&method) {
        return None;
    }
    let mut concatenated = String::new();
    for header in &varying_headers.0 {
        concatenated.push_str(request_headers.get(header).unwrap_or(""));
    }
    let vary_hash = md5_hex(&concatenated);
    let url_hash = md5_hex(url);
    Some(format!("{app_name}:cached:{method}.{url_hash}.{vary_hash}"))
}
