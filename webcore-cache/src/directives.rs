//! `Cache-Control`/`Expires` directive patching.
//!
//! Grounded on `get_cache_response_headers`/`patch_cache_control` in the
//! original: parses the existing `Cache-Control` header into a directive
//! map, merges in the new directives (taking the smaller of two `max-age`
//! values when both are present), and re-serializes. `public`/`private`
//! are recognized but rejected — matching the original's
//! `NotImplementedError` for both.

use std::time::{Duration, SystemTime};

use crate::error::{CacheError, Result};

/// The full set of directives this layer is prepared to patch onto a
/// response, covering every directive §4.1 names for emission:
/// `max_age`, `s_maxage`, `no_cache`, `no_store`, `no_transform`,
/// `must_revalidate`, `proxy_revalidate`, `must_understand`, `immutable`,
/// `stale_while_revalidate`, `stale_if_error`. `public`/`private` are
/// parsed but never emitted — see [`patch_cache_control`]'s `emit_public`/
/// `emit_private` flags, which always fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheDirectives {
    /// `max-age=<seconds>`, clamped against any value already present
    /// (the smaller of the two wins).
    pub max_age: Option<u64>,
    /// `s-maxage=<seconds>`, shared-cache override of `max-age`.
    pub s_maxage: Option<u64>,
    /// `no-store`.
    pub no_store: bool,
    /// `no-cache`.
    pub no_cache: bool,
    /// `no-transform`.
    pub no_transform: bool,
    /// `must-revalidate`.
    pub must_revalidate: bool,
    /// `proxy-revalidate`.
    pub proxy_revalidate: bool,
    /// `must-understand`.
    pub must_understand: bool,
    /// `immutable`.
    pub immutable: bool,
    /// `stale-while-revalidate=<seconds>`.
    pub stale_while_revalidate: Option<u64>,
    /// `stale-if-error=<seconds>`.
    pub stale_if_error: Option<u64>,
}

/// A single `Cache-Control` directive value, either a bare flag or a
/// `key=value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DirectiveValue {
    Flag,
    Value(String),
}

fn parse_cache_control(header: &str) -> Vec<(String, DirectiveValue)> {
    header
        .split(',')
        .filter_map(|field| {
            let field = field.trim();
            if field.is_empty() {
                return None;
            }
            Some(match field.split_once('=') {
                Some((k, v)) => {
                    (k.trim().to_string(), DirectiveValue::Value(v.trim().to_string()))
                }
                None => (field.to_string(), DirectiveValue::Flag),
            })
        })
        .collect()
}

fn render_cache_control(directives: &[(String, DirectiveValue)]) -> Option<String> {
    let rendered: Vec<String> = directives
        .iter()
        .map(|(k, v)| match v {
            DirectiveValue::Flag => k.clone(),
            DirectiveValue::Value(v) => format!("{k}={v}"),
        })
        .collect();
    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join(", "))
    }
}

/// Merge `directives` onto an existing `Cache-Control` header value,
/// returning the new header value (or `None` if the result is empty,
/// meaning the header should be removed).
///
/// `public`/`private` are rejected with
/// [`CacheError::DirectiveNotImplemented`] before anything else runs, the
/// same ordering the original uses.
pub fn patch_cache_control(
    existing: Option<&str>,
    directives: CacheDirectives,
    emit_public: bool,
    emit_private: bool,
) -> Result<Option<String>> {
    if emit_public {
        return Err(CacheError::DirectiveNotImplemented("public"));
    }
    if emit_private {
        return Err(CacheError::DirectiveNotImplemented("private"));
    }

    let mut parsed = parse_cache_control(existing.unwrap_or(""));

    let mut max_age = directives.max_age;
    if let (Some(new_age), Some((_, DirectiveValue::Value(existing_age)))) = (
        max_age,
        parsed.iter().find(|(k, _)| k == "max-age").cloned(),
    ) {
        if let Ok(existing_age) = existing_age.parse::<u64>() {
            max_age = Some(new_age.min(existing_age));
        }
    }

    let mut updates: Vec<(String, DirectiveValue)> = Vec::new();
    if let Some(age) = max_age {
        updates.push(("max-age".into(), DirectiveValue::Value(age.to_string())));
    }
    if let Some(age) = directives.s_maxage {
        updates.push(("s-maxage".into(), DirectiveValue::Value(age.to_string())));
    }
    if directives.no_store {
        updates.push(("no-store".into(), DirectiveValue::Flag));
    }
    if directives.no_cache {
        updates.push(("no-cache".into(), DirectiveValue::Flag));
    }
    if directives.no_transform {
        updates.push(("no-transform".into(), DirectiveValue::Flag));
    }
    if directives.must_revalidate {
        updates.push(("must-revalidate".into(), DirectiveValue::Flag));
    }
    if directives.proxy_revalidate {
        updates.push(("proxy-revalidate".into(), DirectiveValue::Flag));
    }
    if directives.must_understand {
        updates.push(("must-understand".into(), DirectiveValue::Flag));
    }
    if directives.immutable {
        updates.push(("immutable".into(), DirectiveValue::Flag));
    }
    if let Some(secs) = directives.stale_while_revalidate {
        updates.push((
            "stale-while-revalidate".into(),
            DirectiveValue::Value(secs.to_string()),
        ));
    }
    if let Some(secs) = directives.stale_if_error {
        updates.push(("stale-if-error".into(), DirectiveValue::Value(secs.to_string())));
    }

    for (key, value) in updates {
        if let Some(slot) = parsed.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            parsed.push((key, value));
        }
    }

    Ok(render_cache_control(&parsed))
}

/// Compute the `Expires` header value for a response cached with the given
/// `max_age`, clamping negative ages to zero. `None` is returned if an
/// `Expires` header is already present, since the original only ever sets
/// it when absent.
pub fn expires_header(has_existing_expires: bool, max_age_secs: i64) -> Option<String> {
    if has_existing_expires {
        return None;
    }
    let max_age = max_age_secs.max(0) as u64;
    let at = SystemTime::now() + Duration::from_secs(max_age);
    Some(httpdate::fmt_http_date(at))
}
