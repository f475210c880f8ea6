//! Application-facing identity and its projection from validated claims.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::claims::{claim, ClaimSet, ClaimValue};
use crate::error::AuthError;

/// The identity of an authenticated caller, projected from a [`ClaimSet`].
///
/// Stored in request extensions by the gate middleware, alongside the claim
/// set it came from, and dropped with the request. Every field may be empty:
/// a token owes the application none of these claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Display identifier, from the `unique_name` claim.
    pub unique_name: String,
    /// Email fingerprint, from the `email_hash` claim.
    pub email_hash: String,
    /// Granted roles, from the `role` claim.
    pub roles: BTreeSet<String>,
}

impl Identity {
    /// Whether the caller holds the given role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Projects validated claim sets into [`Identity`] values.
///
/// Pure: the same claims always project to the same identity. The one piece
/// of policy is the anonymity check. When enabled, a token whose `default`
/// claim decodes to `1` projects to [`AuthError::NoPermissions`] instead of
/// an identity, and the gate rejects it like any validation failure.
#[derive(Debug, Clone, Default)]
pub struct IdentityProjector {
    deny_anonymous: bool,
}

impl IdentityProjector {
    /// A projector with the anonymity policy disabled.
    pub fn new() -> Self {
        Self {
            deny_anonymous: false,
        }
    }

    /// Enable or disable the anonymity policy.
    pub fn deny_anonymous(mut self, deny: bool) -> Self {
        self.deny_anonymous = deny;
        self
    }

    /// Project a validated claim set into an identity.
    ///
    /// Absent `unique_name`/`email_hash`/`role` claims yield empty fields,
    /// not errors. A `role` claim that is neither a string nor a list of
    /// strings is [`AuthError::MalformedRoleClaim`].
    pub fn project(&self, claims: &ClaimSet) -> Result<Identity, AuthError> {
        if self.deny_anonymous && is_anonymous(claims) {
            return Err(AuthError::NoPermissions);
        }

        Ok(Identity {
            unique_name: claims
                .private_str(claim::UNIQUE_NAME)
                .unwrap_or_default()
                .to_string(),
            email_hash: claims
                .private_str(claim::EMAIL_HASH)
                .unwrap_or_default()
                .to_string(),
            roles: role_set(claims)?,
        })
    }
}

fn role_set(claims: &ClaimSet) -> Result<BTreeSet<String>, AuthError> {
    match claims.private(claim::ROLE) {
        None => Ok(BTreeSet::new()),
        Some(value) => ClaimValue::from_json(value)
            .map(ClaimValue::into_set)
            .ok_or(AuthError::MalformedRoleClaim),
    }
}

/// Whether the anonymous marker claim decodes to 1.
///
/// The wire encoding is a string-encoded integer; a bare integer is accepted
/// too. Anything else counts as not anonymous, the absent claim included.
fn is_anonymous(claims: &ClaimSet) -> bool {
    match claims.private(claim::ANONYMOUS) {
        Some(Value::String(s)) => s.parse::<i64>() == Ok(1),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Extract the [`Identity`] from HTTP request `Parts`, if the gate attached
/// one.
///
/// `None` on open routes and on requests that never passed the gate.
pub fn identity_from_parts(parts: &http::request::Parts) -> Option<&Identity> {
    parts.extensions.get::<Identity>()
}

/// Extract the validated [`ClaimSet`] from HTTP request `Parts`, if the
/// gate attached one.
pub fn claims_from_parts(parts: &http::request::Parts) -> Option<&ClaimSet> {
    parts.extensions.get::<ClaimSet>()
}
