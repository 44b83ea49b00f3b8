//! MIME type detection based on file extensions.

use serde::Deserialize;

use crate::error::{HttpError, Result};

/// MIME type sent when no map matches.
pub const DEFAULT_MIME: &str = "text/plain";

/// One extension to MIME type mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MimeMap {
    /// Extension without the dot, e.g. `"svg"`
    pub extension: String,
    pub mime_type: String,
}

impl MimeMap {
    pub fn new(extension: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            mime_type: mime_type.into(),
        }
    }
}

const BUILTIN: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("ico", "image/x-icon"),
    ("png", "image/png"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("xml", "text/xml"),
    ("pdf", "application/pdf"),
];

/// Resolves the MIME type of `name` from its last extension.
///
/// `additional` maps are consulted before the built-in ones; extensions
/// compare case-insensitively.
///
/// # Example
///
/// ```
/// # use tinyhttpd::http::mime::{mime_type, MimeMap};
/// assert_eq!(mime_type("/index.HTML", &[]), "text/html");
/// let maps = [MimeMap::new("html", "application/xhtml+xml")];
/// assert_eq!(mime_type("/index.html", &maps), "application/xhtml+xml");
/// assert_eq!(mime_type("/README", &[]), "text/plain");
/// ```
pub fn mime_type<'a>(name: &str, additional: &'a [MimeMap]) -> &'a str {
    let Some((_, extension)) = name.rsplit_once('.') else {
        return DEFAULT_MIME;
    };
    if extension.contains('/') {
        return DEFAULT_MIME;
    }

    if let Some(map) = additional
        .iter()
        .find(|m| m.extension.eq_ignore_ascii_case(extension))
    {
        return &map.mime_type;
    }

    BUILTIN
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME)
}

/// Like [`mime_type`], re-validating the caller's declared name length.
pub fn mime_type_checked<'a>(name: &str, name_len: usize, additional: &'a [MimeMap]) -> Result<&'a str> {
    if name.len() != name_len {
        return Err(HttpError::Protocol("declared name length does not match"));
    }
    Ok(mime_type(name, additional))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types() {
        assert_eq!(mime_type("/a/b/logo.gif", &[]), "image/gif");
        assert_eq!(mime_type("photo.JPG", &[]), "image/jpeg");
        assert_eq!(mime_type("favicon.ico", &[]), "image/x-icon");
        assert_eq!(mime_type("page.htm", &[]), "text/html");
    }

    #[test]
    fn unknown_and_missing_extensions_default() {
        assert_eq!(mime_type("archive.tar.zst", &[]), DEFAULT_MIME);
        assert_eq!(mime_type("/dir.d/file", &[]), DEFAULT_MIME);
        assert_eq!(mime_type("noext", &[]), DEFAULT_MIME);
    }

    #[test]
    fn additional_maps_win() {
        let maps = vec![MimeMap::new("zst", "application/zstd")];
        assert_eq!(mime_type("archive.tar.ZST", &maps), "application/zstd");
    }

    #[test]
    fn checked_variant_validates_length() {
        assert_eq!(mime_type_checked("a.css", 5, &[]).unwrap(), "text/css");
        assert!(mime_type_checked("a.css", 4, &[]).is_err());
    }
}
