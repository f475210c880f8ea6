//! Auth-specific error types.

/// Result alias for gate operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors produced while deciding and enforcing request authentication.
///
/// `Display` strings are deliberately category-level and stable: they are
/// what rejection responses echo back to clients. Detailed causes (parser
/// and crypto diagnostics) live in variant fields and should only ever
/// reach server-side logs, via `Debug`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header, or the header value is empty.
    #[error("missing bearer credential")]
    MissingCredential,

    /// The `Authorization` header does not follow `Bearer <token>`.
    #[error("malformed authorization header")]
    MalformedCredential,

    /// The credential is not a structurally valid token.
    #[error("malformed token")]
    MalformedToken {
        /// Parser diagnostic, for logs only.
        detail: String,
    },

    /// Signature verification failed.
    #[error("invalid token signature")]
    InvalidSignature {
        /// Crypto diagnostic, for logs only.
        detail: String,
    },

    /// The `iss` claim is absent or does not equal the configured issuer.
    #[error("token issuer mismatch")]
    IssuerMismatch,

    /// The `aud` claim is absent or does not contain the configured audience.
    #[error("token audience mismatch")]
    AudienceMismatch,

    /// The token is expired or not yet valid.
    #[error("token expired or not yet valid")]
    Expired {
        /// Which temporal check failed, for logs only.
        detail: String,
    },

    /// The `role` claim is present but neither a string nor a list of strings.
    #[error("malformed role claim")]
    MalformedRoleClaim,

    /// The anonymous marker claim is set: the bearer has no permissions.
    #[error("user has no permissions")]
    NoPermissions,

    /// No declared route matches the request (specification-driven rules).
    #[error("no matching route")]
    NoMatchingRoute,

    /// The configured public key could not be loaded.
    ///
    /// Construction-time only: a service seeing this must refuse to start
    /// instead of limping into per-request failures.
    #[error("cannot load verification key")]
    KeyLoad {
        /// Key-parsing diagnostic.
        detail: String,
    },
}

impl AuthError {
    /// Whether this error belongs to a single request.
    ///
    /// True for every variant except [`AuthError::KeyLoad`], which can only
    /// arise while constructing a validator and must abort startup.
    pub fn is_request_error(&self) -> bool {
        !matches!(self, AuthError::KeyLoad { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_category_level() {
        let err = AuthError::InvalidSignature {
            detail: "ASN.1 garbage at offset 12".to_string(),
        };
        // The diagnostic must not leak through Display.
        assert_eq!(err.to_string(), "invalid token signature");
        assert!(format!("{err:?}").contains("offset 12"));
    }

    #[test]
    fn test_display_missing_credential() {
        assert_eq!(
            AuthError::MissingCredential.to_string(),
            "missing bearer credential"
        );
    }

    #[test]
    fn test_display_no_permissions() {
        assert_eq!(AuthError::NoPermissions.to_string(), "user has no permissions");
    }

    #[test]
    fn test_is_request_error() {
        assert!(AuthError::MissingCredential.is_request_error());
        assert!(AuthError::NoMatchingRoute.is_request_error());
        assert!(
            AuthError::Expired {
                detail: "exp".into()
            }
            .is_request_error()
        );
        // Key loading is a startup failure, not a request outcome.
        assert!(
            !AuthError::KeyLoad {
                detail: "bad pem".into()
            }
            .is_request_error()
        );
    }
}
