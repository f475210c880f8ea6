//! The authentication gate: a Tower middleware in front of every route.
//!
//! [`GateLayer`] and [`GateService`] wrap any inner service. Per request the
//! gate resolves the route's security, and for secured routes extracts the
//! bearer credential, validates it, and projects the claims into an
//! [`Identity`] before the request reaches the handler. Generic over
//! [`TokenValidator`], so any token format plugs in.
//!
//! [`Identity`]: crate::Identity

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::IntoResponse;
use http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, Request, StatusCode};
use tower::{Layer, Service};

use crate::error::AuthError;
use crate::identity::IdentityProjector;
use crate::routes::{RouteDecision, RoutePolicy};
use crate::TokenValidator;

/// Tower `Layer` that wraps services with the authentication gate.
pub struct GateLayer<V: TokenValidator> {
    validator: Arc<V>,
    routes: Arc<dyn RoutePolicy>,
    projector: IdentityProjector,
}

impl<V: TokenValidator> GateLayer<V> {
    /// Create a gate over the given route rules and validator.
    ///
    /// Uses the default [`IdentityProjector`]; see [`with_projector`] to
    /// change projection policy.
    ///
    /// [`with_projector`]: GateLayer::with_projector
    pub fn new(routes: impl RoutePolicy, validator: Arc<V>) -> Self {
        Self {
            validator,
            routes: Arc::new(routes),
            projector: IdentityProjector::new(),
        }
    }

    /// Replace the claims→identity projector.
    pub fn with_projector(mut self, projector: IdentityProjector) -> Self {
        self.projector = projector;
        self
    }
}

// Manual impl: deriving would require `V: Clone`, but the validator is
// behind an `Arc` and never needs to be.
impl<V: TokenValidator> Clone for GateLayer<V> {
    fn clone(&self) -> Self {
        Self {
            validator: self.validator.clone(),
            routes: self.routes.clone(),
            projector: self.projector.clone(),
        }
    }
}

impl<V: TokenValidator, S> Layer<S> for GateLayer<V> {
    type Service = GateService<V, S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService {
            inner,
            validator: self.validator.clone(),
            routes: self.routes.clone(),
            projector: self.projector.clone(),
        }
    }
}

/// Tower `Service` that admits or rejects requests before forwarding them.
///
/// For an admitted secured request the validated [`Identity`] and the full
/// [`ClaimSet`] are inserted into request extensions, where downstream
/// handlers and extractors can read them. Every rejection is a uniform
/// `401 Unauthorized`.
///
/// [`Identity`]: crate::Identity
/// [`ClaimSet`]: crate::claims::ClaimSet
pub struct GateService<V: TokenValidator, S> {
    inner: S,
    validator: Arc<V>,
    routes: Arc<dyn RoutePolicy>,
    projector: IdentityProjector,
}

impl<V: TokenValidator, S: Clone> Clone for GateService<V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            validator: self.validator.clone(),
            routes: self.routes.clone(),
            projector: self.projector.clone(),
        }
    }
}

impl<V, S> Service<Request<Body>> for GateService<V, S>
where
    V: TokenValidator,
    S: Service<Request<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send,
{
    type Response = axum::response::Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let validator = self.validator.clone();
        let routes = self.routes.clone();
        let projector = self.projector.clone();

        Box::pin(async move {
            match admit(&mut req, routes.as_ref(), validator.as_ref(), &projector) {
                Ok(()) => {
                    let resp = inner
                        .call(req)
                        .await
                        .unwrap_or_else(|infallible| match infallible {});
                    Ok(resp.into_response())
                }
                Err(err) => {
                    // Debug form carries the detail fields; the response
                    // message stays category-generic.
                    log::warn!(
                        "rejecting {} {}: {err:?}",
                        req.method(),
                        req.uri().path()
                    );
                    Ok(rejection_response(&err))
                }
            }
        })
    }
}

/// Run the full admission sequence for one request.
///
/// Open routes return `Ok` without touching the Authorization header; the
/// validator runs only for secured routes. On success the identity and
/// claims land in the request extensions.
fn admit<V: TokenValidator>(
    req: &mut Request<Body>,
    routes: &dyn RoutePolicy,
    validator: &V,
    projector: &IdentityProjector,
) -> Result<(), AuthError> {
    match routes.resolve(req.method(), req.uri().path()) {
        RouteDecision::NotSecured => return Ok(()),
        RouteDecision::NoMatchingRoute => return Err(AuthError::NoMatchingRoute),
        RouteDecision::Secured => (),
    }

    let credential = bearer_credential(req.headers())?;
    let claims = validator.validate(credential)?;
    let identity = projector.project(&claims)?;

    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(claims);
    Ok(())
}

/// Extract the bearer credential from the Authorization header.
///
/// The credential is everything after the `Bearer ` prefix, untrimmed. The
/// scheme match is exact: other schemes and other casings are malformed.
fn bearer_credential(headers: &HeaderMap) -> Result<&str, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(AuthError::MissingCredential);
    };
    let value = value.to_str().map_err(|_| AuthError::MalformedCredential)?;
    if value.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MalformedCredential)
}

/// Build the uniform 401 rejection with a WWW-Authenticate challenge.
///
/// Every failure mode produces the same shape; the message names the
/// category of the cause and nothing else.
fn rejection_response(err: &AuthError) -> axum::response::Response {
    let body = serde_json::json!({
        "error": {
            "category": "authentication",
            "message": format!("validating JWS: {err}"),
        }
    });

    let mut response = (
        StatusCode::UNAUTHORIZED,
        [(CONTENT_TYPE, "application/json")],
        serde_json::to_string(&body).unwrap_or_default(),
    )
        .into_response();

    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{claim, ClaimSet, RegisteredClaims};
    use crate::identity::Identity;
    use crate::routes::{PatternRules, RouteSpec, SpecRoutes};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use http::Method;
    use tower::ServiceExt;

    // A test validator that accepts two fixed tokens and counts every call,
    // so tests can assert it never ran for open routes.
    struct CountingValidator {
        calls: AtomicUsize,
    }

    impl CountingValidator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenValidator for CountingValidator {
        fn validate(&self, credential: &str) -> Result<ClaimSet, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match credential {
                "valid-token" => Ok(claim_set(serde_json::json!({
                    claim::UNIQUE_NAME: "alice",
                    claim::EMAIL_HASH: "a1b2c3",
                    claim::ROLE: ["admin", "user"],
                }))),
                "anon-token" => Ok(claim_set(serde_json::json!({
                    claim::UNIQUE_NAME: "guest",
                    claim::ANONYMOUS: "1",
                }))),
                _ => Err(AuthError::InvalidSignature {
                    detail: "bad token".to_string(),
                }),
            }
        }
    }

    fn claim_set(private: serde_json::Value) -> ClaimSet {
        let map = private
            .as_object()
            .expect("test claims must be an object")
            .clone();
        ClaimSet::new(RegisteredClaims::default(), map)
    }

    fn admin_only() -> PatternRules {
        PatternRules::builder()
            .secure(Method::GET, "^/admin$")
            .build()
    }

    /// Mock inner service that captures what the gate injected.
    #[derive(Clone)]
    struct MockService {
        captured_identity: Arc<Mutex<Option<Identity>>>,
        saw_claims: Arc<Mutex<bool>>,
    }

    impl MockService {
        fn new() -> Self {
            Self {
                captured_identity: Arc::new(Mutex::new(None)),
                saw_claims: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl Service<Request<Body>> for MockService {
        type Response = axum::response::Response;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Body>) -> Self::Future {
            let captured = self.captured_identity.clone();
            let saw_claims = self.saw_claims.clone();
            Box::pin(async move {
                *captured.lock().unwrap() = req.extensions().get::<Identity>().cloned();
                *saw_claims.lock().unwrap() = req.extensions().get::<ClaimSet>().is_some();
                Ok((StatusCode::OK, "ok").into_response())
            })
        }
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn get_with_auth(path: &str, auth: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("Authorization", auth)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_bearer_credential_valid() {
        let req = get_with_auth("/admin", "Bearer my-token-123");
        assert_eq!(bearer_credential(req.headers()).unwrap(), "my-token-123");
    }

    #[test]
    fn test_bearer_credential_missing_header() {
        let req = get("/admin");
        assert!(matches!(
            bearer_credential(req.headers()),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_bearer_credential_empty_value() {
        let req = get_with_auth("/admin", "");
        assert!(matches!(
            bearer_credential(req.headers()),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn test_bearer_credential_wrong_scheme() {
        let req = get_with_auth("/admin", "Basic dXNlcjpwYXNz");
        assert!(matches!(
            bearer_credential(req.headers()),
            Err(AuthError::MalformedCredential)
        ));
    }

    #[test]
    fn test_bearer_credential_scheme_without_token() {
        let req = get_with_auth("/admin", "Bearer");
        assert!(matches!(
            bearer_credential(req.headers()),
            Err(AuthError::MalformedCredential)
        ));
    }

    #[test]
    fn test_bearer_credential_scheme_is_case_sensitive() {
        let req = get_with_auth("/admin", "bearer my-token");
        assert!(matches!(
            bearer_credential(req.headers()),
            Err(AuthError::MalformedCredential)
        ));
    }

    #[test]
    fn test_bearer_credential_is_untrimmed() {
        let req = get_with_auth("/admin", "Bearer  padded");
        assert_eq!(bearer_credential(req.headers()).unwrap(), " padded");
    }

    #[test]
    fn test_rejection_response_shape() {
        let resp = rejection_response(&AuthError::MissingCredential);
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer"))
        );
        assert_eq!(
            resp.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
    }

    #[tokio::test]
    async fn test_rejection_response_names_the_cause() {
        let resp = rejection_response(&AuthError::MissingCredential);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body["error"]["message"],
            "validating JWS: missing bearer credential"
        );
        assert_eq!(body["error"]["category"], "authentication");
    }

    #[tokio::test]
    async fn test_gate_open_route_skips_validation() {
        let mock = MockService::new();
        let captured = mock.captured_identity.clone();
        let validator = Arc::new(CountingValidator::new());
        let service = GateLayer::new(admin_only(), validator.clone()).layer(mock);

        // Garbage credential on an open route must not matter.
        let resp = service
            .oneshot(get_with_auth("/public", "Bearer garbage"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(validator.calls(), 0);
        assert!(captured.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gate_missing_credential_rejected_before_validation() {
        let mock = MockService::new();
        let validator = Arc::new(CountingValidator::new());
        let service = GateLayer::new(admin_only(), validator.clone()).layer(mock);

        let resp = service.oneshot(get("/admin")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(validator.calls(), 0);
    }

    #[tokio::test]
    async fn test_gate_malformed_credential_rejected_before_validation() {
        let mock = MockService::new();
        let validator = Arc::new(CountingValidator::new());
        let service = GateLayer::new(admin_only(), validator.clone()).layer(mock);

        let resp = service
            .oneshot(get_with_auth("/admin", "Basic dXNlcjpwYXNz"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(validator.calls(), 0);
    }

    #[tokio::test]
    async fn test_gate_invalid_token_rejected() {
        let mock = MockService::new();
        let validator = Arc::new(CountingValidator::new());
        let service = GateLayer::new(admin_only(), validator.clone()).layer(mock);

        let resp = service
            .oneshot(get_with_auth("/admin", "Bearer bad-token"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(validator.calls(), 1);
    }

    #[tokio::test]
    async fn test_gate_valid_token_injects_identity_and_claims() {
        let mock = MockService::new();
        let captured = mock.captured_identity.clone();
        let saw_claims = mock.saw_claims.clone();
        let validator = Arc::new(CountingValidator::new());
        let service = GateLayer::new(admin_only(), validator).layer(mock);

        let resp = service
            .oneshot(get_with_auth("/admin", "Bearer valid-token"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let identity = captured.lock().unwrap();
        let identity = identity.as_ref().expect("identity should be injected");
        assert_eq!(identity.unique_name, "alice");
        assert_eq!(identity.email_hash, "a1b2c3");
        assert!(identity.has_role("admin"));
        assert!(identity.has_role("user"));
        assert!(*saw_claims.lock().unwrap());
    }

    #[tokio::test]
    async fn test_gate_unmatched_spec_route_rejected() {
        let mock = MockService::new();
        let validator = Arc::new(CountingValidator::new());
        let routes = SpecRoutes::new(vec![RouteSpec::new(
            Method::GET,
            "/widgets/{id}",
            vec!["bearer".to_string()],
        )]);
        let service = GateLayer::new(routes, validator.clone()).layer(mock);

        let resp = service
            .oneshot(get_with_auth("/nonexistent", "Bearer valid-token"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(validator.calls(), 0);
    }

    #[tokio::test]
    async fn test_gate_denies_anonymous_when_configured() {
        let mock = MockService::new();
        let validator = Arc::new(CountingValidator::new());
        let service = GateLayer::new(admin_only(), validator)
            .with_projector(IdentityProjector::new().deny_anonymous(true))
            .layer(mock);

        let resp = service
            .oneshot(get_with_auth("/admin", "Bearer anon-token"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_gate_admits_anonymous_by_default() {
        let mock = MockService::new();
        let validator = Arc::new(CountingValidator::new());
        let service = GateLayer::new(admin_only(), validator).layer(mock);

        let resp = service
            .oneshot(get_with_auth("/admin", "Bearer anon-token"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
