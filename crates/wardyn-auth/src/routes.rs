//! Route security rules: which requests must authenticate.
//!
//! Two interchangeable rule flavors sit behind the [`RoutePolicy`] trait,
//! picked once at construction; the gate itself never branches on the
//! flavor:
//!
//! - [`PatternRules`] — a static method→regex allowlist, fail-open
//! - [`SpecRoutes`] — an already-parsed route-specification table, fail-closed
//!
//! Both are immutable after construction and read concurrently by every
//! in-flight request.

use std::collections::HashMap;

use http::Method;
use regex::Regex;

/// Outcome of resolving a request against the route security declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// The route requires a validated bearer credential.
    Secured,
    /// The route is open; the request passes through untouched.
    NotSecured,
    /// No declared route matches the request.
    ///
    /// Only [`SpecRoutes`] produces this; the gate rejects such requests.
    NoMatchingRoute,
}

/// The route-security side of the gate: decides, per request, whether
/// authentication is mandatory.
pub trait RoutePolicy: Send + Sync + 'static {
    /// Resolve a request's method and path against the declaration.
    fn resolve(&self, method: &Method, path: &str) -> RouteDecision;
}

/// Static allowlist: method → regex patterns evaluated against the request
/// path.
///
/// A request is secured iff its method is declared and at least one of that
/// method's patterns matches the path. Everything else passes through
/// unauthenticated: these rules FAIL OPEN. A route missing from the list
/// is reachable without any credential, so operators must list every path
/// that needs protection and should prefer anchored patterns.
///
/// Patterns are unanchored, `regexp.MatchString`-style: `"admin"` matches
/// `/admin`, `/admin/users` and `/unadministered`; write `^/admin$` to match
/// one path exactly. Pattern order never changes the outcome. A pattern
/// that fails to compile is dropped with a warning and never matches.
#[derive(Debug, Clone, Default)]
pub struct PatternRules {
    rules: HashMap<Method, Vec<Regex>>,
}

impl PatternRules {
    /// No rules at all: every request passes through unauthenticated.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start declaring rules.
    pub fn builder() -> PatternRulesBuilder {
        PatternRulesBuilder {
            declarations: Vec::new(),
        }
    }
}

impl RoutePolicy for PatternRules {
    fn resolve(&self, method: &Method, path: &str) -> RouteDecision {
        let Some(patterns) = self.rules.get(method) else {
            return RouteDecision::NotSecured;
        };
        if patterns.iter().any(|pattern| pattern.is_match(path)) {
            RouteDecision::Secured
        } else {
            RouteDecision::NotSecured
        }
    }
}

/// Builder for [`PatternRules`].
#[derive(Debug, Clone)]
pub struct PatternRulesBuilder {
    declarations: Vec<(Method, String)>,
}

impl PatternRulesBuilder {
    /// Require authentication for requests of `method` whose path matches
    /// `pattern`.
    pub fn secure(mut self, method: Method, pattern: impl Into<String>) -> Self {
        self.declarations.push((method, pattern.into()));
        self
    }

    /// Compile the declaration.
    ///
    /// An unparsable pattern is logged and skipped rather than failing the
    /// whole rule set; it behaves as if it matched nothing.
    pub fn build(self) -> PatternRules {
        let mut rules: HashMap<Method, Vec<Regex>> = HashMap::new();
        for (method, pattern) in self.declarations {
            match Regex::new(&pattern) {
                Ok(compiled) => rules.entry(method).or_default().push(compiled),
                Err(err) => {
                    log::warn!("dropping unparsable route pattern {pattern:?}: {err}");
                }
            }
        }
        PatternRules { rules }
    }
}

/// One declared route in a specification-driven deployment.
#[derive(Debug, Clone)]
pub struct RouteSpec {
    method: Method,
    template: String,
    security: Vec<String>,
}

impl RouteSpec {
    /// Declare a route: a method, a path template, and the names of the
    /// security requirements its operation carries.
    ///
    /// Templates use one `{param}` placeholder per path segment, as in
    /// `/widgets/{id}`. An empty `security` list declares the route open.
    pub fn new(method: Method, template: impl Into<String>, security: Vec<String>) -> Self {
        Self {
            method,
            template: template.into(),
            security,
        }
    }
}

/// Specification-driven rules: an already-parsed route table, resolved per
/// request by best-matching path template.
///
/// Matching is segment-wise against the concrete path: a literal segment
/// matches only itself, a `{param}` segment matches any single segment, and
/// segment counts must agree (no trailing-slash normalization). Among
/// matching templates the one with the most literal segments wins; ties
/// keep declaration order. The matched route is secured iff its operation
/// declares at least one security requirement.
///
/// Unlike [`PatternRules`], a request matching no template does not pass
/// through: it resolves to [`RouteDecision::NoMatchingRoute`] and the gate
/// rejects it.
#[derive(Debug, Clone)]
pub struct SpecRoutes {
    routes: Vec<RouteSpec>,
}

impl SpecRoutes {
    /// Wrap a parsed route table.
    pub fn new(routes: Vec<RouteSpec>) -> Self {
        Self { routes }
    }

    fn find(&self, method: &Method, path: &str) -> Option<&RouteSpec> {
        let segments: Vec<&str> = path.split('/').collect();
        let mut best: Option<(usize, &RouteSpec)> = None;
        for route in self.routes.iter().filter(|route| route.method == *method) {
            let Some(score) = template_score(&route.template, &segments) else {
                continue;
            };
            match best {
                Some((top, _)) if score <= top => {}
                _ => best = Some((score, route)),
            }
        }
        best.map(|(_, route)| route)
    }
}

impl RoutePolicy for SpecRoutes {
    fn resolve(&self, method: &Method, path: &str) -> RouteDecision {
        match self.find(method, path) {
            None => RouteDecision::NoMatchingRoute,
            Some(route) if route.security.is_empty() => RouteDecision::NotSecured,
            Some(_) => RouteDecision::Secured,
        }
    }
}

/// Score a template against pre-split path segments.
///
/// `None` when the template cannot match; otherwise the number of literal
/// segments it matched with (more literal = more specific).
fn template_score(template: &str, segments: &[&str]) -> Option<usize> {
    let template_segments: Vec<&str> = template.split('/').collect();
    if template_segments.len() != segments.len() {
        return None;
    }

    let mut literals = 0;
    for (expected, actual) in template_segments.iter().zip(segments) {
        if is_param(expected) {
            continue;
        }
        if expected != actual {
            return None;
        }
        literals += 1;
    }
    Some(literals)
}

fn is_param(segment: &str) -> bool {
    segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}')
}
