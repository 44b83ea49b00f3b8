use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{Credentials, compare};

/// Decodes the `name:password` bytes of an `Authorization: Basic` value.
pub fn decode(authorization: &str) -> Option<Vec<u8>> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }
    STANDARD.decode(token.trim()).ok()
}

/// Checks an `Authorization` header value against the expected credentials.
pub fn verify(authorization: &str, credentials: &Credentials) -> bool {
    let Some(candidate) = decode(authorization) else {
        return false;
    };
    let expected = format!("{}:{}", credentials.name, credentials.password);
    compare(expected.as_bytes(), &candidate).equal
}

/// The `WWW-Authenticate` header line of a Basic challenge.
pub fn challenge(realm: &str) -> String {
    format!("WWW-Authenticate: Basic realm=\"{realm}\"\r\n")
}

/// Encodes credentials the way a client sends them.
pub fn authorization(name: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{name}:{password}")))
}
