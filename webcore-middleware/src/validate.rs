//! Static diagnostics over a compiled stack's execution order.
//!
//! Grounded on `validate_middleware_stack` in
//! `examples/original_source/fastblocks/actions/gather/middleware.py`,
//! specifically its three checks: `_check_middleware_ordering`,
//! `_check_security_middleware`, and `_check_session_auth_ordering`.

/// The outcome of [`validate`]: never a hard failure (a stack with
/// warnings still compiles and serves requests fine) — `valid` only goes
/// `false` if `errors` is non-empty, and nothing in this module currently
/// produces one. `errors` exists for parity with the original's report
/// shape and as a home for future structural checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// `true` unless `errors` is non-empty.
    pub valid: bool,
    /// Non-fatal ordering concerns.
    pub warnings: Vec<String>,
    /// Fatal structural problems. Always empty today.
    pub errors: Vec<String>,
    /// Suggestions that don't rise to a warning (e.g. "consider adding
    /// security middleware").
    pub recommendations: Vec<String>,
}

/// Check `execution_order` (outermost first, as returned by
/// `CompiledStack::execution_order` or `GatherReport::execution_order`)
/// against the three heuristics the original applies.
pub fn validate(execution_order: &[String]) -> ValidationReport {
    let mut report = ValidationReport { valid: true, ..Default::default() };

    check_ordering(execution_order, &mut report);
    check_security_presence(execution_order, &mut report);
    check_session_auth_ordering(execution_order, &mut report);

    report
}

/// First stage should be the error-handling stage, and the stage
/// immediately before the router should be the exception-mapper —
/// anything else means the stack was assembled unusually (e.g. a
/// hand-built `CompiledStack` rather than one produced by
/// [`crate::stack::MiddlewareStack::build`]).
fn check_ordering(order: &[String], report: &mut ValidationReport) {
    match order.first() {
        Some(first) if first == "ErrorHandlingMiddleware" => {}
        Some(first) => report.warnings.push(format!(
            "expected ErrorHandlingMiddleware as the outermost stage, found {first}"
        )),
        None => report.warnings.push("middleware stack is empty".to_string()),
    }

    if order.len() < 2 {
        return;
    }
    let pre_router = &order[order.len() - 2];
    if pre_router != "ExceptionMappingMiddleware" {
        report.warnings.push(format!(
            "expected ExceptionMappingMiddleware immediately before the router, found {pre_router}"
        ));
    }
}

/// Recommend security middleware if none of the usual names appear.
/// Grounded on `_check_security_middleware`'s search for
/// `CORSMiddleware`/`TrustedHostMiddleware`/`HTTPSRedirectMiddleware`.
fn check_security_presence(order: &[String], report: &mut ValidationReport) {
    const SECURITY_NAMES: [&str; 3] =
        ["SecurityMiddleware", "CorsMiddleware", "HttpsRedirectMiddleware"];
    let has_security = order.iter().any(|name| SECURITY_NAMES.contains(&name.as_str()));
    if !has_security {
        report.recommendations.push(
            "no security middleware (CORS, HTTPS redirect, or security headers) detected; \
             consider adding one"
                .to_string(),
        );
    }
}

/// Warn if session middleware sits inside (closer to the router than)
/// authentication middleware — sessions should load before auth consults
/// them. Grounded on `_check_session_auth_ordering`.
fn check_session_auth_ordering(order: &[String], report: &mut ValidationReport) {
    let session_index = order.iter().position(|name| name == "SessionMiddleware");
    let auth_index = order.iter().position(|name| name == "AuthenticationMiddleware");
    if let (Some(session), Some(auth)) = (session_index, auth_index) {
        if session > auth {
            report.warnings.push(
                "SessionMiddleware appears after AuthenticationMiddleware in the execution \
                 order; sessions should be loaded before authentication runs"
                    .to_string(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn well_formed_stack_with_security_and_correct_session_auth_order_is_clean() {
        let report = validate(&order(&[
            "ErrorHandlingMiddleware",
            "SecurityMiddleware",
            "CorsMiddleware",
            "SessionMiddleware",
            "AuthenticationMiddleware",
            "ExceptionMappingMiddleware",
            "Router",
        ]));
        assert!(report.warnings.is_empty());
        assert!(report.recommendations.is_empty());
        assert!(report.valid);
    }

    #[test]
    fn missing_security_middleware_is_recommended() {
        let report = validate(&order(&["ErrorHandlingMiddleware", "Router"]));
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn session_after_auth_warns() {
        let report = validate(&order(&[
            "ErrorHandlingMiddleware",
            "SecurityMiddleware",
            "AuthenticationMiddleware",
            "SessionMiddleware",
            "Router",
        ]));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("SessionMiddleware"));
    }

    #[test]
    fn wrong_outer_and_inner_stages_warn() {
        let report = validate(&order(&["SecurityMiddleware", "AuthenticationMiddleware", "Router"]));
        assert!(report.warnings.iter().any(|w| w.contains("outermost")));
        assert!(report.warnings.iter().any(|w| w.contains("ExceptionMappingMiddleware")));
    }
}
