//! Canonicalization functionality for signature generation and validation.
//!
//! This includes various URL and header canonicalization functions, as well as the ability to
//! create an AWS SigV4 canonical request. The signer and the local signature checker both go
//! through [`CanonicalRequest`], so the bytes that get signed are exactly the bytes that get
//! checked.
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions. This is exposed for
//! testing purposes only.

use {
    crate::{
        constants::*,
        crypto::{sha256, sha256_hex},
        IdentityProofError,
    },
    http::{
        header::{HeaderMap, HeaderValue},
        method::Method,
        uri::Uri,
    },
    lazy_static::lazy_static,
    log::trace,
    qualifier_attr::qualifiers,
    regex::Regex,
    std::{
        collections::HashMap,
        fmt::{Debug, Formatter, Result as FmtResult},
        str::from_utf8,
    },
};

lazy_static! {
    /// Multiple slash pattern for condensing URIs
    static ref MULTISLASH: Regex = Regex::new("//+").unwrap();
}

/// A canonicalized request for AWS SigV4.
///
/// This is mainly used internally for generating the canonical request for signing, but is
/// exposed for testing and debugging purposes.
#[derive(Clone)]
pub struct CanonicalRequest {
    /// The HTTP method for the request (e.g., "GET", "POST", etc.)
    request_method: String,

    /// The canonicalized path from the HTTP request. This is guaranteed to be ASCII.
    canonical_path: String,

    /// Query parameters from the HTTP request, normalized to be percent-encoded. Values are
    /// ordered as they appear in the URL.
    query_parameters: HashMap<String, Vec<String>>,

    /// Headers from the HTTP request, keyed by lower-case name. Values are normalized and ordered
    /// as they appear in the HTTP request.
    headers: HashMap<String, Vec<Vec<u8>>>,

    /// The SHA-256 hash of the body.
    body_sha256: String,
}

impl CanonicalRequest {
    /// Create a CanonicalRequest from the components of an HTTP request.
    ///
    /// # Errors
    /// Returns [`IdentityProofError::Canonicalization`] if the URI path is not absolute or
    /// navigates above the root, if a percent-escape is malformed, or if the path, query string,
    /// or a header value contains characters outside the allowed set.
    pub fn from_parts(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap<HeaderValue>,
        body: &[u8],
    ) -> Result<Self, IdentityProofError> {
        let canonical_path = canonicalize_uri_path(uri.path())?;
        let query_parameters = query_string_to_normalized_map(uri.query().unwrap_or(""))?;
        let headers = normalize_headers(headers)?;
        let body_sha256 = sha256_hex(body);

        Ok(CanonicalRequest {
            request_method: method.to_string(),
            canonical_path,
            query_parameters,
            headers,
            body_sha256,
        })
    }

    /// Retrieve the HTTP request method.
    #[inline(always)]
    pub fn request_method(&self) -> &str {
        &self.request_method
    }

    /// Retrieve the canonicalized URI path from the request.
    #[inline(always)]
    pub fn canonical_path(&self) -> &str {
        &self.canonical_path
    }

    /// Retrieve the normalized query parameters from the request.
    #[inline(always)]
    pub fn query_parameters(&self) -> &HashMap<String, Vec<String>> {
        &self.query_parameters
    }

    /// Retrieve the normalized headers from the request.
    #[inline(always)]
    pub fn headers(&self) -> &HashMap<String, Vec<Vec<u8>>> {
        &self.headers
    }

    /// Retrieve the SHA-256 hash of the request body.
    #[inline(always)]
    pub fn body_sha256(&self) -> &str {
        &self.body_sha256
    }

    /// Get the canonical query string from the request.
    pub fn canonical_query_string(&self) -> String {
        canonicalize_query_to_string(&self.query_parameters)
    }

    /// The headers a signer covers: every header in the request except `authorization`, sorted.
    pub fn default_signed_headers(&self) -> Vec<String> {
        let mut result: Vec<String> =
            self.headers.keys().filter(|k| k.as_str() != HDR_AUTHORIZATION).cloned().collect();
        result.sort_unstable();
        result
    }

    /// Render the
    /// [canonical request](https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html)
    /// covering `signed_headers`, which must be lower-case and sorted. Names that are not present are skipped.
    pub fn canonical_request(&self, signed_headers: &[String]) -> Vec<u8> {
        let mut header_block = Vec::new();
        for name in signed_headers {
            let Some(values) = self.headers.get(name) else {
                continue;
            };

            header_block.extend_from_slice(name.as_bytes());
            header_block.push(b':');
            header_block.extend(values.join(&b","[..]));
            header_block.push(b'\n');
        }

        let query = self.canonical_query_string();
        let signed = signed_headers.join(";");
        let sections: [&[u8]; 6] = [
            self.request_method.as_bytes(),
            self.canonical_path.as_bytes(),
            query.as_bytes(),
            &header_block,
            signed.as_bytes(),
            self.body_sha256.as_bytes(),
        ];
        let result = sections.join(&b'\n');

        trace!("Canonical request:\n{}", String::from_utf8_lossy(&result));
        result
    }

    /// Get the SHA-256 hash of the
    /// [canonical request](https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html).
    pub fn canonical_request_sha256(&self, signed_headers: &[String]) -> [u8; SHA256_OUTPUT_LEN] {
        sha256(&self.canonical_request(signed_headers))
    }
}

impl Debug for CanonicalRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let headers = debug_headers(&self.headers);

        f.debug_struct("CanonicalRequest")
            .field("request_method", &self.request_method)
            .field("canonical_path", &self.canonical_path)
            .field("query_parameters", &self.query_parameters)
            .field("headers", &headers)
            .field("body_sha256", &self.body_sha256)
            .finish()
    }
}

/// Indicates whether we are normalizing a URI path element or a query string element. This is used to create the
/// correct error message.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[derive(Clone, Copy, Debug)]
enum UriElement {
    /// URI element represents a path
    Path,

    /// URI element represents a query string
    Query,
}

impl UriElement {
    fn error(self, detail: &str) -> IdentityProofError {
        match self {
            Self::Path => IdentityProofError::Canonicalization(format!("Invalid URI path: {}", detail)),
            Self::Query => IdentityProofError::Canonicalization(format!("Malformed query string: {}", detail)),
        }
    }
}

/// Convert a [`HashMap`] of query parameters to a string for the canonical request.
///
/// Parameters are sorted by encoded key, then by encoded value. `X-Amz-Signature` is never part of the canonical
/// query string.
pub fn canonicalize_query_to_string(query_parameters: &HashMap<String, Vec<String>>) -> String {
    let mut results = Vec::new();

    for (key, values) in query_parameters.iter() {
        // Don't include the signature itself.
        if key != QP_X_AMZ_SIGNATURE {
            for value in values.iter() {
                results.push((key.as_str(), value.as_str()));
            }
        }
    }

    results.sort_unstable();
    results.iter().map(|(key, value)| format!("{}={}", key, value)).collect::<Vec<String>>().join("&")
}

/// Canonicalize an absolute URI path: runs of slashes are condensed, each segment is normalized, and `.`/`..`
/// segments are resolved. An empty path becomes `/`.
pub fn canonicalize_uri_path(uri_path: &str) -> Result<String, IdentityProofError> {
    if uri_path.is_empty() || uri_path == "/" {
        return Ok("/".to_string());
    }

    if !uri_path.starts_with('/') {
        return Err(UriElement::Path.error(&format!("Path is not absolute: {}", uri_path)));
    }

    let condensed = MULTISLASH.replace_all(uri_path, "/");
    let mut segments: Vec<String> = Vec::new();

    // A trailing slash shows up as a final empty segment and is preserved.
    for raw in condensed[1..].split('/') {
        match normalize_uri_path_component(raw)?.as_str() {
            "." => (),
            ".." => {
                if segments.pop().is_none() {
                    return Err(UriElement::Path
                        .error(&format!("Relative path entry '..' navigates above root: {}", condensed)));
                }
            }
            segment => segments.push(segment.to_string()),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Formats HTTP headers in a HashMap suitable for debugging. Credentials are redacted.
fn debug_headers(headers: &HashMap<String, Vec<Vec<u8>>>) -> String {
    let mut keys: Vec<&String> = headers.keys().collect();
    keys.sort_unstable();

    let mut lines = Vec::new();
    for key in keys {
        for value in &headers[key] {
            if key == HDR_X_AMZ_SECURITY_TOKEN {
                lines.push(format!("{}: <redacted>", key));
            } else {
                lines.push(format!("{}: {}", key, String::from_utf8_lossy(value)));
            }
        }
    }

    lines.join("\n")
}

/// Indicates whether the specified byte is RFC3986 unreserved -- i.e., can be represented without being
/// percent-encoded, e.g. '?' -> '%3F'.
#[inline(always)]
pub fn is_rfc3986_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b'_' || c == b'~'
}

/// Indicates whether the specified byte may legitimately appear unescaped in a URI path or query element. These
/// are the RFC 3986 unreserved and sub-delimiter characters, plus `:`, `@`, `/`, and `?`. Anything else
/// (controls, space, non-ASCII, `"<>\^`{|}#`) is rejected rather than quietly escaped.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[inline(always)]
fn is_rfc3986_allowed_raw(c: u8) -> bool {
    is_rfc3986_unreserved(c) || b"!$&'()*+,;=:@/?".contains(&c)
}

/// Indicates whether the specified byte may appear in a header value that is going to be signed.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[inline(always)]
fn is_allowed_header_value_byte(c: u8) -> bool {
    c == b'\t' || (0x20..0x7f).contains(&c)
}

/// Convert a Latin-1 slice of bytes to a UTF-8 string.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    let mut result = String::new();
    for b in bytes {
        result.push(*b as char);
    }
    result
}

/// Returns a dictionary containing the lower-case header names and their normalized values.
///
/// # Errors
/// Returns [`IdentityProofError::Canonicalization`] if a header value contains a control
/// character (other than horizontal tab), DEL, or a non-ASCII byte.
pub fn normalize_headers(
    headers: &HeaderMap<HeaderValue>,
) -> Result<HashMap<String, Vec<Vec<u8>>>, IdentityProofError> {
    let mut result = HashMap::<String, Vec<Vec<u8>>>::new();
    for (key, value) in headers.iter() {
        let key = key.as_str().to_lowercase();
        if let Some(pos) = value.as_bytes().iter().position(|c| !is_allowed_header_value_byte(*c)) {
            return Err(IdentityProofError::Canonicalization(format!(
                "Header '{}' contains a disallowed character at offset {}",
                key, pos
            )));
        }

        let value = normalize_header_value(value.as_bytes());
        result.entry(key).or_default().push(value);
    }

    Ok(result)
}

/// Normalizes a header value by trimming whitespace and converting runs of spaces and tabs to a single space.
pub fn normalize_header_value(value: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(value.len());

    // Remove leading whitespace and reduce multiple spaces to a single space.
    let mut last_was_space = true;

    for c in value {
        if *c == b' ' || *c == b'\t' {
            if !last_was_space {
                result.push(b' ');
                last_was_space = true;
            }
        } else {
            result.push(*c);
            last_was_space = false;
        }
    }

    if last_was_space {
        // Remove trailing spaces.
        while result.last() == Some(&b' ') {
            result.pop();
        }
    }

    result
}

/// Normalize a single element (key or value from key=value) of a query string.
pub fn normalize_query_string_element(element: &str) -> Result<String, IdentityProofError> {
    normalize_uri_element(element, UriElement::Query)
}

/// Normalizes a path element of a URI.
pub fn normalize_uri_path_component(path: &str) -> Result<String, IdentityProofError> {
    normalize_uri_element(path, UriElement::Path)
}

/// Normalize the URI or query string according to RFC 3986.  This performs the following operations:
/// * Alpha, digit, and the symbols `-`, `.`, `_`, and `~` (unreserved characters) are left alone.
/// * Other characters from the allowed raw set are percent-encoded; `+` becomes `%20`.
/// * Percent-encoded values are upper-cased (`%2a` becomes `%2A`)
/// * Percent-encoded values in the unreserved space (`%41`-`%5A`, `%61`-`%7A`, `%30`-`%39`, `%2D`, `%2E`, `%5F`,
///   `%7E`) are converted to normal characters.
///
/// If a percent encoding is incomplete, or a character outside the allowed set appears, an error is returned.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_uri_element(uri_el: &str, uri_el_type: UriElement) -> Result<String, IdentityProofError> {
    let path_component = uri_el.as_bytes();
    let mut i = 0;
    let mut result = Vec::<u8>::with_capacity(path_component.len());

    while i < path_component.len() {
        let c = path_component[i];

        if is_rfc3986_unreserved(c) {
            result.push(c);
            i += 1;
        } else if c == b'%' {
            if i + 2 >= path_component.len() {
                // % encoding would go beyond end of string.
                return Err(uri_el_type.error(MSG_INCOMPLETE_TRAILING_ESCAPE));
            }

            let hex_digits = &path_component[i + 1..i + 3];
            match hex::decode(hex_digits) {
                Ok(value) => {
                    let c = value[0];

                    if is_rfc3986_unreserved(c) {
                        result.push(c);
                    } else {
                        // Rewrite the hex-escape so it's always upper-cased.
                        result.push(b'%');
                        result.extend(u8_to_upper_hex(c));
                    }
                    i += 3;
                }
                Err(_) => {
                    let message = format!(
                        "{}{}{}",
                        MSG_ILLEGAL_HEX_CHAR,
                        latin1_to_string(&hex_digits[..1]),
                        latin1_to_string(&hex_digits[1..2])
                    );
                    return Err(uri_el_type.error(&message));
                }
            }
        } else if c == b'+' {
            // Plus-encoded space. Convert this to %20.
            result.extend_from_slice(b"%20");
            i += 1;
        } else if is_rfc3986_allowed_raw(c) {
            // Legal but reserved; escape it.
            result.push(b'%');
            result.extend(u8_to_upper_hex(c));
            i += 1;
        } else {
            return Err(uri_el_type.error(&format!("Disallowed character 0x{:02X} at offset {}", c, i)));
        }
    }

    // Only ASCII is ever pushed into the result.
    Ok(from_utf8(result.as_slice()).map(|s| s.to_string()).unwrap_or_default())
}

/// Normalize the query parameters by normalizing the keys and values of each parameter and return a `HashMap` mapping
/// each key to a *vector* of values (since it is valid for a query parameters to appear multiple times).
///
/// The order of the values matches the order that they appeared in the query string.
pub fn query_string_to_normalized_map(query_string: &str) -> Result<HashMap<String, Vec<String>>, IdentityProofError> {
    if query_string.is_empty() {
        return Ok(HashMap::new());
    }

    // Split the query string into parameters on '&' boundaries.
    let components = query_string.split('&');
    let mut result = HashMap::<String, Vec<String>>::new();

    for component in components {
        if component.is_empty() {
            // Empty component; skip it.
            continue;
        }

        // Split the parameter into key and value portions on the '='
        let (key, value) = component.split_once('=').unwrap_or((component, ""));

        // Normalize the key and value.
        let norm_key = normalize_query_string_element(key)?;
        let norm_value = normalize_query_string_element(value)?;

        result.entry(norm_key).or_default().push(norm_value);
    }

    Ok(result)
}

/// Percent-encode a string for use as a query string key or value. Only RFC 3986 unreserved characters are left
/// alone, so the output is already in canonical form.
pub fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.bytes() {
        if is_rfc3986_unreserved(c) {
            result.push(c as char);
        } else {
            let hex = u8_to_upper_hex(c);
            result.push('%');
            result.push(hex[0] as char);
            result.push(hex[1] as char);
        }
    }
    result
}

/// Returns a byte slice with leading and trailing ASCII whitespace bytes removed.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
const fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let mut bytes = bytes;
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

/// Convert a byte to uppercase hex representation.
#[inline(always)]
pub const fn u8_to_upper_hex(b: u8) -> [u8; 2] {
    [HEX_DIGITS_UPPER[((b >> 4) & 0xf) as usize], HEX_DIGITS_UPPER[(b & 0xf) as usize]]
}

/// Unescapes a URI percent-encoded string. Returns `None` if the string contains an invalid percent encoding or the
/// decoded bytes are not UTF-8.
pub fn unescape_uri_encoding(s: &str) -> Option<String> {
    let mut result = Vec::with_capacity(s.len());
    let mut chars = s.bytes();

    while let Some(c) = chars.next() {
        if c == b'%' {
            let hex_digits = [chars.next()?, chars.next()?];
            result.push(hex::decode(hex_digits).ok()?[0]);
        } else {
            result.push(c);
        }
    }

    String::from_utf8(result).ok()
}
