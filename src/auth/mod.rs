//! Basic and Digest authentication
//!
//! The server asks an [`AuthenticationCheck`](crate::server::callbacks::AuthenticationCheck)
//! which scheme a resource needs and with which credentials. The helpers here
//! verify what the client sent; the connection handles challenges and the
//! nonce table lifecycle.

pub mod basic;
pub mod digest;
pub mod nonce;

use serde::Deserialize;

use crate::http::request::Method;
use crate::server::callbacks::AuthenticationCheck;

pub use nonce::{NonceState, NonceTable};

/// Credentials a request must present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub password: String,
    pub realm: String,
}

impl Credentials {
    pub fn new(name: impl Into<String>, password: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            realm: realm.into(),
        }
    }
}

/// What an authentication check requires for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    NoAuthRequired,
    Basic(Credentials),
    Digest(Credentials),
}

/// Result of a comparison that keeps going past the first mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub equal: bool,
    /// Bytes examined; always the candidate length
    pub steps: usize,
}

/// Compares `candidate` against `expected` without stopping early.
///
/// The loop runs over the whole candidate even after a mismatch. Its bound
/// still depends on the candidate length, so timing is not fully uniform.
pub fn compare(expected: &[u8], candidate: &[u8]) -> Comparison {
    let mut mismatch = expected.len() != candidate.len();
    let mut steps = 0;

    for (i, &byte) in candidate.iter().enumerate() {
        steps += 1;
        mismatch |= expected.get(i).is_none_or(|&e| e != byte);
    }

    Comparison {
        equal: !mismatch,
        steps,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    Basic,
    Digest,
}

/// One set of credentials guarding every resource under a path prefix
#[derive(Debug, Clone, Deserialize)]
pub struct StaticCredentials {
    pub scheme: AuthScheme,
    pub realm: String,
    pub name: String,
    pub password: String,
    /// Resources starting with this prefix require authentication
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "/".to_string()
}

impl AuthenticationCheck for StaticCredentials {
    fn check(&self, _method: Method, resource: &str) -> AuthDecision {
        if !resource.starts_with(&self.prefix) {
            return AuthDecision::NoAuthRequired;
        }

        let credentials = Credentials::new(&self.name, &self.password, &self.realm);
        match self.scheme {
            AuthScheme::Basic => AuthDecision::Basic(credentials),
            AuthScheme::Digest => AuthDecision::Digest(credentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_runs_full_candidate_length() {
        let result = compare(b"user:pass", b"xser:pass");
        assert!(!result.equal);
        assert_eq!(result.steps, 9);

        let result = compare(b"user:pass", b"user:pass");
        assert!(result.equal);
        assert_eq!(result.steps, 9);
    }

    #[test]
    fn comparison_rejects_prefixes_and_extensions() {
        assert!(!compare(b"user:pass", b"user:pas").equal);
        assert!(!compare(b"user:pass", b"user:passX").equal);
        assert_eq!(compare(b"user:pass", b"user:passX").steps, 10);
        assert!(!compare(b"abc", b"").equal);
    }

    #[test]
    fn static_credentials_guard_prefix() {
        let check = StaticCredentials {
            scheme: AuthScheme::Basic,
            realm: "X".into(),
            name: "user".into(),
            password: "pass".into(),
            prefix: "/secret".into(),
        };
        assert_eq!(check.check(Method::GET, "/index.html"), AuthDecision::NoAuthRequired);
        assert_eq!(
            check.check(Method::GET, "/secret/a"),
            AuthDecision::Basic(Credentials::new("user", "pass", "X"))
        );
    }
}
