//! Digest challenge/response (MD5, qop=auth).
//!
//! The response is always computed as
//! `MD5(HA1:nonce:nc:cnonce:"auth":HA2)`, also for clients that omit `qop`,
//! which is what some deployed clients expect.

use std::collections::HashMap;

use md5::{Digest, Md5};

use crate::auth::nonce::NONCE_SIZE;
use crate::http::request::Method;

/// Longest `Authorization` value read from a request head.
pub const MAX_AUTHORIZATION: usize = 1024;

const MAX_NC: usize = 8;
const MAX_CNONCE: usize = 128;
const MAX_USERNAME: usize = 128;
const RESPONSE_SIZE: usize = 32;

/// The fields of an `Authorization: Digest ...` value the server uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestAuthorization {
    pub username: String,
    pub realm: Option<String>,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub nc: String,
    pub cnonce: String,
}

impl DigestAuthorization {
    /// Parses a header value of the form `Digest key=value, key="value", ...`.
    ///
    /// Returns `None` when the scheme is not Digest or a required field is missing.
    pub fn parse(value: &str) -> Option<Self> {
        let (scheme, rest) = value.trim().split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut params = parse_params(rest)?;
        let mut take = |key: &str| params.remove(key);

        Some(Self {
            username: take("username")?,
            realm: take("realm"),
            nonce: take("nonce")?,
            uri: take("uri")?,
            response: take("response")?.to_ascii_lowercase(),
            nc: take("nc").unwrap_or_default(),
            cnonce: take("cnonce").unwrap_or_default(),
        })
    }

    /// Per-field bounds: the uri shares the resource limit, the nonce and
    /// response have fixed sizes.
    pub fn within_limits(&self, max_resource: usize) -> bool {
        self.uri.len() <= max_resource
            && self.nonce.len() == NONCE_SIZE
            && self.response.len() == RESPONSE_SIZE
            && self.nc.len() <= MAX_NC
            && self.cnonce.len() <= MAX_CNONCE
            && self.username.len() <= MAX_USERNAME
    }
}

/// Splits a comma separated `key=value` list; quoted values may hold commas.
fn parse_params(input: &str) -> Option<HashMap<String, String>> {
    let mut out = HashMap::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b',') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b',' {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            return None;
        }
        let key = input[key_start..i].trim().to_ascii_lowercase();
        i += 1;

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = if bytes.get(i) == Some(&b'"') {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i] != b'"' {
                i += 1;
            }
            if i >= bytes.len() {
                return None;
            }
            let value = &input[start..i];
            i += 1;
            value
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != b',' {
                i += 1;
            }
            input[start..i].trim()
        };

        out.insert(key, value.to_string());
    }

    Some(out)
}

/// Lower-case hex MD5 of `parts` joined with `:`.
pub fn hex_md5(parts: &[&[u8]]) -> String {
    let mut hasher = Md5::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b":");
        }
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

/// Everything the expected response depends on.
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    pub name: &'a str,
    pub realm: &'a str,
    pub password: &'a str,
    pub method: Method,
    pub uri: &'a str,
    pub nonce: &'a str,
    pub nc: &'a str,
    pub cnonce: &'a str,
}

/// The response a client holding the right password sends.
pub fn expected_response(input: &DigestInput<'_>) -> String {
    let ha1 = hex_md5(&[
        input.name.as_bytes(),
        input.realm.as_bytes(),
        input.password.as_bytes(),
    ]);
    let ha2 = hex_md5(&[input.method.as_str().as_bytes(), input.uri.as_bytes()]);

    hex_md5(&[
        ha1.as_bytes(),
        input.nonce.as_bytes(),
        input.nc.as_bytes(),
        input.cnonce.as_bytes(),
        b"auth",
        ha2.as_bytes(),
    ])
}

/// The `WWW-Authenticate` header line of a Digest challenge.
pub fn challenge(realm: &str, nonce: &str) -> String {
    format!(
        "WWW-Authenticate: Digest realm=\"{realm}\", algorithm=md5, nonce=\"{nonce}\", qop=\"auth\"\r\n"
    )
}
