//! Validated claim sets and the wire-level claim contract.
//!
//! A [`ClaimSet`] is only ever produced by a [`TokenValidator`] after the
//! credential's signature and registered claims have been checked; nothing
//! else in the pipeline constructs one. It is immutable from then on.
//!
//! [`TokenValidator`]: crate::TokenValidator

use std::collections::BTreeSet;

use serde_json::Value;

/// Wire-level private claim names.
///
/// Interoperability with the token issuer depends on these exact spellings.
pub mod claim {
    /// Display identifier of the bearer; scalar string.
    pub const UNIQUE_NAME: &str = "unique_name";
    /// Fingerprint of the bearer's email address; scalar string.
    pub const EMAIL_HASH: &str = "email_hash";
    /// Role or roles granted to the bearer; string or list of strings.
    pub const ROLE: &str = "role";
    /// Anonymous marker; string-encoded integer, `"1"` means anonymous.
    pub const ANONYMOUS: &str = "default";
}

/// Registered (RFC 7519) claims, as already verified by the validator.
///
/// These are informational by the time they reach application code: issuer,
/// audience and the temporal claims have all been checked before a
/// [`ClaimSet`] exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisteredClaims {
    /// `iss` claim.
    pub issuer: Option<String>,
    /// `sub` claim.
    pub subject: Option<String>,
    /// `aud` claim, normalized to a list (the wire form may be a scalar).
    pub audience: Vec<String>,
    /// `exp` claim, seconds since the Unix epoch.
    pub expires_at: Option<u64>,
    /// `nbf` claim, seconds since the Unix epoch.
    pub not_before: Option<u64>,
    /// `iat` claim, seconds since the Unix epoch.
    pub issued_at: Option<u64>,
}

/// A set of claims that survived cryptographic validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    registered: RegisteredClaims,
    private: serde_json::Map<String, Value>,
}

impl ClaimSet {
    /// Assemble a claim set from verified parts.
    ///
    /// Callers are validator implementations; everything downstream of the
    /// gate only reads.
    pub fn new(registered: RegisteredClaims, private: serde_json::Map<String, Value>) -> Self {
        Self { registered, private }
    }

    /// The registered claims.
    pub fn registered(&self) -> &RegisteredClaims {
        &self.registered
    }

    /// A private claim by name, in its raw JSON form.
    pub fn private(&self, name: &str) -> Option<&Value> {
        self.private.get(name)
    }

    /// A private claim by name, if it is a scalar string.
    ///
    /// `None` both when the claim is absent and when it has another shape.
    pub fn private_str(&self, name: &str) -> Option<&str> {
        self.private.get(name).and_then(Value::as_str)
    }
}

/// A private claim that may arrive as a scalar or as a list of strings, a
/// duck-typing quirk of the token issuer's JSON.
///
/// The identity projector resolves this union exactly once; downstream code
/// only ever sees the normalized set form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValue {
    /// A single string value.
    Scalar(String),
    /// A list of string values.
    List(Vec<String>),
}

impl ClaimValue {
    /// Interpret a raw JSON claim value.
    ///
    /// `None` for any shape other than a string or an array of strings
    /// (including an array with a non-string element).
    pub fn from_json(value: &Value) -> Option<ClaimValue> {
        match value {
            Value::String(s) => Some(ClaimValue::Scalar(s.clone())),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    list.push(item.as_str()?.to_string());
                }
                Some(ClaimValue::List(list))
            }
            _ => None,
        }
    }

    /// Collapse either form into a set of strings.
    ///
    /// A scalar becomes a singleton; duplicates in a list collapse.
    pub fn into_set(self) -> BTreeSet<String> {
        match self {
            ClaimValue::Scalar(s) => BTreeSet::from([s]),
            ClaimValue::List(items) => items.into_iter().collect(),
        }
    }
}
