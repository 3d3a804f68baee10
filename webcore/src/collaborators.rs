//! Stub collaborator interfaces for everything explicitly out of scope for
//! this workspace: template rendering, input validation, and
//! configuration reload. Implementations live in the application that
//! embeds this core; only the interface — small, explicit, passed in as a
//! constructor argument — lives here, per §9's "capability interfaces
//! instead of duck typing" design note.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Renders a named template against a context map. Out of scope: the
/// component discovery, HTMX fragment assembly, and template compilation
/// this would sit on top of aren't implemented here.
#[async_trait::async_trait]
pub trait TemplateRenderer: Send + Sync + 'static {
    /// Render `name` with `context`, returning the rendered body.
    async fn render(
        &self,
        name: &str,
        context: &HashMap<String, String>,
    ) -> Result<String, TemplateError>;
}

/// A template rendering failure.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// No template registered under this name.
    #[error("template not found: {0}")]
    NotFound(String),
    /// The template engine rejected the context or template body.
    #[error("template render failed: {0}")]
    RenderFailed(String),
}

/// Input sanitisation / pattern matching (XSS, SQL injection, etc.). Out
/// of scope: no concrete validation rules are implemented here.
#[async_trait::async_trait]
pub trait Validator: Send + Sync + 'static {
    /// Validate a single named field's value.
    async fn validate(&self, field: &str, value: &str) -> Result<(), ValidationError>;
}

/// A validation failure for a single field.
#[derive(Error, Debug)]
#[error("validation failed for {field}: {reason}")]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Why it failed.
    pub reason: String,
}

/// Configuration reload, called by `webcore-sync` after a successful
/// settings sync (§4.3.10). Out of scope: the adapter registry and config
/// source this reloads from aren't implemented here.
#[async_trait::async_trait]
pub trait Configuration: Send + Sync + 'static {
    /// Reload configuration for the named adapters (derived from synced
    /// file stems).
    async fn reload(&self, adapters: &[String]) -> Result<(), ConfigError>;
}

/// A configuration reload failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The reload call itself failed (bad source, parse error downstream).
    #[error("configuration reload failed: {0}")]
    ReloadFailed(String),
}

/// Adapts a [`Configuration`] to the [`webcore_sync::ConfigReloader`] shape
/// `sync_settings` expects, so an application only has to implement
/// `Configuration` once and hand this wrapper to both this crate and
/// `webcore-sync` without `webcore-sync` depending back on `webcore`.
pub struct ConfigurationReloader(pub Arc<dyn Configuration>);

impl fmt::Debug for ConfigurationReloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigurationReloader").finish()
    }
}

#[async_trait::async_trait]
impl webcore_sync::ConfigReloader for ConfigurationReloader {
    async fn reload(&self, adapters: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.reload(adapters).await.map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}

/// Renders an error as an HTTP response body. Split between an
/// HTMX-aware/plain-HTML mode in the original; both are a
/// `TemplateRenderer`-backed concern and out of scope here. This crate
/// ships only the hook and a minimal fallback so the middleware stack's
/// error-handling stage has something to call when no richer renderer is
/// wired in.
pub trait ErrorRenderer: Send + Sync + 'static {
    /// Render `status`/`message` as a response body with its content type.
    fn render(&self, status: u16, message: &str) -> (&'static str, Vec<u8>);
}

/// The fallback [`ErrorRenderer`]: `text/plain`, `"{status} {message}"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextErrorRenderer;

impl ErrorRenderer for PlainTextErrorRenderer {
    fn render(&self, status: u16, message: &str) -> (&'static str, Vec<u8>) {
        ("text/plain; charset=utf-8", format!("{status} {message}").into_bytes())
    }
}
