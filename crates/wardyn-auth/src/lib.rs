//! Request-time authentication gate for HTTP services.
//!
//! Provides:
//! - [`GateLayer`] / [`GateService`] — Tower middleware parameterised over `TokenValidator`
//! - [`TokenValidator`] — Trait for credential validation (implement per token format)
//! - [`RoutePolicy`] with [`PatternRules`] and [`SpecRoutes`] — which routes must authenticate
//! - [`Identity`] / [`IdentityProjector`] — projection of validated claims into a caller identity
//! - [`claims`] — claim material as downstream handlers see it
//! - [`AuthError`] — gate-specific error types
//!
//! The gate sits in front of a router. Open routes pass through untouched;
//! secured routes require a bearer credential that survives validation, and
//! handlers behind the gate read the caller's [`Identity`] from request
//! extensions.

pub mod claims;
mod error;
mod identity;
mod middleware;
mod routes;

pub use claims::ClaimSet;
pub use error::{AuthError, Result};
pub use identity::{claims_from_parts, identity_from_parts, Identity, IdentityProjector};
pub use middleware::{GateLayer, GateService};
pub use routes::{
    PatternRules, PatternRulesBuilder, RouteDecision, RoutePolicy, RouteSpec, SpecRoutes,
};

/// Trait for validating bearer credentials.
///
/// Implement this per token format. The gate calls `validate()` with the
/// raw credential (the Authorization header value minus the `Bearer `
/// prefix) once route resolution demands authentication, and never before.
/// The returned [`ClaimSet`] holds exactly the claims that survived
/// validation.
pub trait TokenValidator: Send + Sync + 'static {
    /// Validate a credential and return the claims it carries.
    fn validate(&self, credential: &str) -> std::result::Result<ClaimSet, AuthError>;
}
