//! Assembly of the compiled pipeline: user middleware plus the seven
//! system positions, wrapped by the error-handling and exception-mapping
//! stages, in front of the application router.
//!
//! Grounded on `_build_middleware_stack`/`gather_middleware` in
//! `examples/original_source/fastblocks/actions/gather/middleware.py`: a
//! synchronous list-building algorithm there (the original's own
//! `asyncio.gather` call has nothing to actually await concurrently — its
//! three "tasks" are plain functions wrapped in coroutines), reproduced
//! here as ordinary, non-async composition since nothing in it performs
//! I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::position::MiddlewarePosition;
use crate::stage::{
    error_handling_stage, exception_mapping_stage, BoxHttpService, ErrorHandler, MiddlewareStage,
    PlainTextErrorHandler,
};

/// The result of compiling a [`MiddlewareStack`]: the fully wrapped
/// service plus the class-name sequence it was built from, outermost
/// first — the Rust analogue of the original's
/// `get_middleware_stack_info`/`extract_middleware_info` introspection.
#[derive(Clone)]
pub struct CompiledStack {
    /// The composed service: calling it runs every stage outer-to-inner
    /// on the way in, inner-to-outer on the way out, ending at whatever
    /// router [`MiddlewareStack::new`] was given.
    pub service: BoxHttpService,
    /// Stage names, outermost first, ending with `"Router"`.
    pub execution_order: Vec<String>,
}

impl std::fmt::Debug for CompiledStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStack")
            .field("execution_order", &self.execution_order)
            .finish_non_exhaustive()
    }
}

/// Accumulated facts about a completed stack assembly: counts and the
/// final execution order, mirroring `MiddlewareGatherResult` in the
/// original (`user_middleware`, `system_middleware`, `middleware_stack`,
/// `errors`, `total_middleware`, `has_errors`).
#[derive(Debug, Clone, Default)]
pub struct GatherReport {
    /// Number of user-supplied stages in the stack.
    pub user_middleware: usize,
    /// Number of system positions actually populated (defaults count as
    /// populated here; see [`MiddlewareStack::build_report`]).
    pub system_middleware: usize,
    /// Stage names, outermost first, ending with `"Router"`.
    pub execution_order: Vec<String>,
    /// Errors accumulated while gathering. Always empty for a stack built
    /// entirely from in-process `add_*_middleware` calls (nothing here can
    /// fail); kept for parity with the original's error-accumulating
    /// gather and for callers that build a report from an external source.
    pub errors: Vec<String>,
}

impl GatherReport {
    /// Total stage count (user + system), excluding the error-handling
    /// stage, exception-mapper, and router.
    pub fn total_middleware(&self) -> usize {
        self.user_middleware + self.system_middleware
    }

    /// Whether any gather errors were recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// An inserted user-middleware entry: the stage plus where
/// [`MiddlewareStack::add_user_middleware`] was asked to put it.
struct UserEntry {
    stage: MiddlewareStage,
}

/// Deterministic, position-indexed middleware stack manager (§4.2).
///
/// Built once per application with its innermost router service, then
/// grown with [`add_user_middleware`](Self::add_user_middleware) and
/// [`add_system_middleware`](Self::add_system_middleware) calls — each of
/// which invalidates the cached compiled pipeline, so the next
/// [`build`](Self::build) recompiles. [`invalidate`](Self::invalidate) is
/// also exposed directly for the cross-cutting case in §4.2's "Cache
/// invalidation integration": a `webcore-sync` cache-sync run that
/// invalidates a `gather:*` namespace should call it too (wire
/// `Arc::new({ let s = stack.clone(); move || s.invalidate() })` in as one
/// of `webcore_sync::SyncEngine`'s `on_gather_invalidate` hooks).
pub struct MiddlewareStack {
    router: BoxHttpService,
    user_middleware: Vec<UserEntry>,
    system_overrides: HashMap<MiddlewarePosition, MiddlewareStage>,
    error_stage: MiddlewareStage,
    exception_mapper: MiddlewareStage,
    compiled: Mutex<Option<Arc<CompiledStack>>>,
}

impl std::fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("user_middleware", &self.user_middleware.len())
            .field("system_overrides", &self.system_overrides.len())
            .finish_non_exhaustive()
    }
}

impl MiddlewareStack {
    /// Build an (initially empty) stack around `router`, the innermost
    /// service every request eventually reaches.
    ///
    /// Uses [`PlainTextErrorHandler`] for both the error-handling and
    /// exception-mapping stages until overridden with
    /// [`with_error_handler`](Self::with_error_handler); `debug_mode` is
    /// `false`.
    pub fn new(router: BoxHttpService) -> Self {
        let default_handler: Arc<dyn ErrorHandler> = Arc::new(PlainTextErrorHandler);
        Self {
            router,
            user_middleware: Vec::new(),
            system_overrides: HashMap::new(),
            error_stage: error_handling_stage(false, default_handler.clone()),
            exception_mapper: exception_mapping_stage(HashMap::new(), default_handler),
            compiled: Mutex::new(None),
        }
    }

    /// Replace the outermost error-handling stage's renderer and debug
    /// mode. Invalidates the compiled stack.
    pub fn with_error_handler(mut self, debug_mode: bool, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_stage = error_handling_stage(debug_mode, handler);
        self.invalidate();
        self
    }

    /// Replace the exception-mapping stage's registered per-status handler
    /// map and fallback. Invalidates the compiled stack.
    pub fn with_exception_handlers(
        mut self,
        handlers: HashMap<u16, Arc<dyn ErrorHandler>>,
        default: Arc<dyn ErrorHandler>,
    ) -> Self {
        self.exception_mapper = exception_mapping_stage(handlers, default);
        self.invalidate();
        self
    }

    /// Append (or, if `position` is given, insert at that index in the
    /// user-middleware list) a user-supplied stage. Invalidates the
    /// compiled stack.
    pub fn add_user_middleware(&mut self, stage: MiddlewareStage, position: Option<usize>) {
        let entry = UserEntry { stage };
        match position {
            Some(index) => {
                let index = index.min(self.user_middleware.len());
                self.user_middleware.insert(index, entry);
            }
            None => self.user_middleware.push(entry),
        }
        self.invalidate();
    }

    /// Override the system stage at `position`, replacing whatever
    /// default (or previous override) sat there. Invalidates the compiled
    /// stack.
    pub fn add_system_middleware(&mut self, position: MiddlewarePosition, stage: MiddlewareStage) {
        self.system_overrides.insert(position, stage);
        self.invalidate();
    }

    /// Drop the cached compiled pipeline so the next [`build`](Self::build)
    /// recompiles from the current stages. Safe to call even if nothing
    /// has actually changed.
    pub fn invalidate(&self) {
        *self.compiled.lock().expect("middleware stack mutex poisoned") = None;
    }

    /// Produce (or return the cached) compiled pipeline.
    ///
    /// Per §4.2: "Caches the result until the next add/override" — the
    /// cache is a single `Arc<CompiledStack>` behind a mutex, invalidated
    /// by any `add_*_middleware` call or an explicit
    /// [`invalidate`](Self::invalidate).
    pub fn build(&self) -> Arc<CompiledStack> {
        let mut guard = self.compiled.lock().expect("middleware stack mutex poisoned");
        if let Some(compiled) = guard.as_ref() {
            return compiled.clone();
        }
        let compiled = Arc::new(self.compile());
        *guard = compiled.clone().into();
        compiled
    }

    /// Like [`build`](Self::build) but returns only the introspection
    /// summary ([`GatherReport`]), matching the original's
    /// `gather_middleware` return value. Uses the same cached pipeline
    /// [`build`](Self::build) would, so calling both costs one compile at
    /// most.
    pub fn build_report(&self) -> GatherReport {
        let compiled = self.build();
        GatherReport {
            user_middleware: self.user_middleware.len(),
            system_middleware: MiddlewarePosition::ALL.len(),
            execution_order: compiled.execution_order.clone(),
            errors: Vec::new(),
        }
    }

    fn compile(&self) -> CompiledStack {
        let mut names = Vec::with_capacity(
            self.user_middleware.len() + MiddlewarePosition::ALL.len() + 3,
        );

        // Innermost first (router), then wrap outward: exception-mapper,
        // system stages high-position-to-low, user middleware in reverse
        // insertion order, error-handling stage last (outermost).
        let mut svc = self.router.clone();
        names.push("Router".to_string());

        names.push(self.exception_mapper.name().to_string());
        svc = self.exception_mapper.apply(svc);

        for position in MiddlewarePosition::ALL.iter().rev() {
            if let Some(stage) = self.system_overrides.get(position) {
                names.push(stage.name().to_string());
                svc = stage.apply(svc);
            } else {
                names.push(position.name().to_string());
                // No override: the default for this position is a no-op
                // pass-through. A real deployment supplies every position
                // it cares about via `add_system_middleware`; this crate
                // has no opinion on what "default" security headers or
                // CORS policy should be (out of scope, §1).
                svc = MiddlewareStage::custom(position.name(), |inner| inner).apply(svc);
            }
        }

        for entry in self.user_middleware.iter().rev() {
            names.push(entry.stage.name().to_string());
            svc = entry.stage.apply(svc);
        }

        names.push(self.error_stage.name().to_string());
        svc = self.error_stage.apply(svc);

        names.reverse();
        CompiledStack { service: svc, execution_order: names }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use tower::{Service, ServiceExt};

    fn router() -> BoxHttpService {
        tower::service_fn(|_req: crate::stage::HttpRequest| async move {
            Ok::<crate::stage::HttpResponse, crate::stage::BoxError>(
                http::Response::builder()
                    .status(200)
                    .body(BodyExt::boxed(Full::new(Bytes::from("ok"))))
                    .unwrap(),
            )
        })
        .boxed_clone()
    }

    fn req() -> crate::stage::HttpRequest {
        http::Request::get("/x").body(BodyExt::boxed(Full::new(Bytes::new()))).unwrap()
    }

    #[test]
    fn empty_stack_order_is_error_handler_then_exception_mapper_then_router() {
        let stack = MiddlewareStack::new(router());
        let compiled = stack.build();
        assert_eq!(
            compiled.execution_order,
            vec!["ErrorHandlingMiddleware", "ExceptionMappingMiddleware", "Router"]
        );
    }

    #[test]
    fn user_middleware_appends_in_insertion_order_between_error_handler_and_system() {
        let mut stack = MiddlewareStack::new(router());
        stack.add_user_middleware(MiddlewareStage::custom("First", |s| s), None);
        stack.add_user_middleware(MiddlewareStage::custom("Second", |s| s), None);
        let compiled = stack.build();
        let first = compiled.execution_order.iter().position(|n| n == "First").unwrap();
        let second = compiled.execution_order.iter().position(|n| n == "Second").unwrap();
        let error_handler =
            compiled.execution_order.iter().position(|n| n == "ErrorHandlingMiddleware").unwrap();
        assert!(error_handler < first);
        assert!(first < second);
    }

    #[test]
    fn numeric_position_inserts_into_user_middleware_list() {
        let mut stack = MiddlewareStack::new(router());
        stack.add_user_middleware(MiddlewareStage::custom("A", |s| s), None);
        stack.add_user_middleware(MiddlewareStage::custom("B", |s| s), None);
        stack.add_user_middleware(MiddlewareStage::custom("C", |s| s), Some(1));
        let compiled = stack.build();
        let order: Vec<&str> = compiled
            .execution_order
            .iter()
            .filter(|n| ["A", "B", "C"].contains(&n.as_str()))
            .map(|s| s.as_str())
            .collect();
        assert_eq!(order, vec!["A", "C", "B"]);
    }

    #[test]
    fn system_override_replaces_default_at_its_position() {
        let mut stack = MiddlewareStack::new(router());
        stack.add_system_middleware(
            MiddlewarePosition::Cors,
            MiddlewareStage::custom("MyCors", |s| s),
        );
        let compiled = stack.build();
        assert!(compiled.execution_order.contains(&"MyCors".to_string()));
        assert!(!compiled.execution_order.contains(&"CorsMiddleware".to_string()));
    }

    #[test]
    fn build_is_cached_until_invalidated() {
        let mut stack = MiddlewareStack::new(router());
        let first = stack.build();
        let second = stack.build();
        assert!(Arc::ptr_eq(&first, &second));

        stack.add_user_middleware(MiddlewareStage::custom("New", |s| s), None);
        let third = stack.build();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn explicit_invalidate_forces_recompile_without_changes() {
        let stack = MiddlewareStack::new(router());
        let first = stack.build();
        stack.invalidate();
        let second = stack.build();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn compiled_service_runs_request_through_to_router() {
        let stack = MiddlewareStack::new(router());
        let compiled = stack.build();
        let mut service = compiled.service.clone();
        let res = service.ready().await.unwrap().call(req()).await.unwrap();
        assert_eq!(res.status(), 200);
    }
}
