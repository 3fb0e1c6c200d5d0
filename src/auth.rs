//! AWS SigV4 signature parsing and validation routines.
//!
//! The verifier uses [`SigV4Authenticator::from_signed_request`] to pull the credential scope, timestamp, and signed
//! header list out of a proof before deciding whether it is worth replaying. [`SigV4Authenticator::validate_signature`]
//! performs the same check STS does; it backs test-double STS endpoints.
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions. This is exposed for
//! testing purposes only.

use {
    crate::{
        canonical::{latin1_to_string, trim_ascii, unescape_uri_encoding},
        chronoutil::{format_amz_date, parse_amz_date},
        constants::*,
        CredentialScope, IdentityProofError, KSecretKey, SignedRequest,
    },
    chrono::{DateTime, Duration, Utc},
    derive_builder::Builder,
    http::status::StatusCode,
    log::{debug, trace},
    std::{
        collections::HashMap,
        fmt::{Debug, Formatter, Result as FmtResult},
        str::FromStr,
    },
    subtle::ConstantTimeEq,
};

/// How the request carried its authentication parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthenticationLocation {
    /// An `Authorization: AWS4-HMAC-SHA256 ...` header.
    Header,

    /// `X-Amz-*` query parameters of a pre-signed URL.
    QueryString,
}

/// Low-level structure for performing AWS SigV4 authentication after a canonical request has been generated.
#[derive(Builder, Clone)]
#[builder(derive(Debug))]
pub struct SigV4Authenticator {
    /// Where the authentication parameters were found.
    location: AuthenticationLocation,

    /// The SHA-256 hash of the canonical request.
    canonical_request_sha256: [u8; SHA256_OUTPUT_LEN],

    /// The access key id from the credential.
    access_key: String,

    /// The credential scope from the credential.
    credential_scope: CredentialScope,

    /// The sorted, lower-case signed header names.
    signed_headers: Vec<String>,

    /// The optional session token.
    #[builder(setter(into, strip_option), default)]
    session_token: Option<String>,

    /// The signature passed into the request.
    signature: String,

    /// The timestamp of the request, from either the `X-Amz-Date` query string or header.
    request_timestamp: DateTime<Utc>,

    /// The lifetime of a pre-signed URL.
    #[builder(setter(strip_option), default)]
    expires: Option<Duration>,
}

impl SigV4Authenticator {
    /// Create a builder for `SigV4Authenticator`.
    #[inline(always)]
    pub fn builder() -> SigV4AuthenticatorBuilder {
        SigV4AuthenticatorBuilder::default()
    }

    /// Extract the authentication parameters from a signed request and hash its canonical request.
    ///
    /// # Errors
    /// Returns [`IdentityProofError::MalformedPayload`] if the request carries no authentication, carries both an
    /// `Authorization` header and `X-Amz-Algorithm`, uses an algorithm other than `AWS4-HMAC-SHA256`, is missing
    /// `Credential`/`Signature`/`SignedHeaders`/`X-Amz-Date`, has an unparseable timestamp or credential, or does not
    /// sign `host`. Returns [`IdentityProofError::Canonicalization`] if the request cannot be canonicalized.
    pub fn from_signed_request(request: &SignedRequest) -> Result<Self, IdentityProofError> {
        let cr = request.canonical_request()?;
        let auth_header = cr.headers().get(HDR_AUTHORIZATION);
        let sig_algs = cr.query_parameters().get(QP_X_AMZ_ALGORITHM);

        let (mut builder, signed_headers, timestamp_str) = match (auth_header, sig_algs) {
            (Some(auth_header), None) => parameters_from_auth_header(&auth_header[0], cr.headers())?,
            (None, Some(sig_algs)) => parameters_from_query(&sig_algs[0], cr.query_parameters())?,
            (Some(_), Some(_)) => {
                return Err(IdentityProofError::MalformedPayload(
                    "Request has both an Authorization header and X-Amz-Algorithm query parameter".to_string(),
                ))
            }
            (None, None) => {
                return Err(IdentityProofError::MalformedPayload(MSG_REQUEST_MISSING_AUTH_TOKEN.to_string()))
            }
        };

        if !signed_headers.iter().any(|h| h == HDR_HOST) {
            return Err(IdentityProofError::MalformedPayload(
                "'Host' must be a 'SignedHeader' in the AWS Authorization.".to_string(),
            ));
        }

        let timestamp = parse_amz_date(&timestamp_str).ok_or_else(|| {
            IdentityProofError::MalformedPayload(format!(
                "Date must be in ISO-8601 'basic format'. Got '{}'. See http://en.wikipedia.org/wiki/ISO_8601",
                timestamp_str
            ))
        })?;

        builder.request_timestamp(timestamp);
        builder.canonical_request_sha256(cr.canonical_request_sha256(&signed_headers));
        builder.signed_headers(signed_headers);

        builder.build().map_err(|e| IdentityProofError::MalformedPayload(e.to_string()))
    }

    /// Where the authentication parameters were found.
    #[inline(always)]
    pub fn location(&self) -> AuthenticationLocation {
        self.location
    }

    /// Retrieve the SHA-256 hash of the canonical request.
    #[inline(always)]
    pub fn canonical_request_sha256(&self) -> [u8; SHA256_OUTPUT_LEN] {
        self.canonical_request_sha256
    }

    /// Retrieve the access key id.
    #[inline(always)]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Retrieve the credential scope.
    #[inline(always)]
    pub fn credential_scope(&self) -> &CredentialScope {
        &self.credential_scope
    }

    /// Retrieve the sorted signed header names.
    #[inline(always)]
    pub fn signed_headers(&self) -> &[String] {
        &self.signed_headers
    }

    /// Retrieve the optional session token.
    #[inline(always)]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Retrieve the signature passed into the request.
    #[inline(always)]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Retrieve the timestamp of the request.
    #[inline(always)]
    pub fn request_timestamp(&self) -> DateTime<Utc> {
        self.request_timestamp
    }

    /// Retrieve the lifetime of a pre-signed URL.
    #[inline(always)]
    pub fn expires(&self) -> Option<Duration> {
        self.expires
    }

    /// Verify the request parameters make sense for the region, service, and specified timestamp.
    /// This must be called successfully before calling [validate_signature][Self::validate_signature].
    pub fn prevalidate(
        &self,
        region: &str,
        service: &str,
        server_timestamp: DateTime<Utc>,
        allowed_mismatch: Duration,
    ) -> Result<(), IdentityProofError> {
        let req_ts = self.request_timestamp();
        let min_ts = server_timestamp.checked_sub_signed(allowed_mismatch).unwrap_or(server_timestamp);
        let max_ts = server_timestamp.checked_add_signed(allowed_mismatch).unwrap_or(server_timestamp);

        // Make sure date isn't expired...
        if req_ts < min_ts {
            trace!("prevalidate: request timestamp {} is before minimum timestamp {}", req_ts, min_ts);
            return Err(signature_does_not_match(format!(
                "Signature expired: {} is now earlier than {} ({} - {}.)",
                format_amz_date(&req_ts),
                format_amz_date(&min_ts),
                format_amz_date(&server_timestamp),
                duration_to_string(allowed_mismatch)
            )));
        }

        // ... or too far into the future.
        if req_ts > max_ts {
            trace!("prevalidate: request timestamp {} is after maximum timestamp {}", req_ts, max_ts);
            return Err(signature_does_not_match(format!(
                "Signature not yet current: {} is still later than {} ({} + {}.)",
                format_amz_date(&req_ts),
                format_amz_date(&max_ts),
                format_amz_date(&server_timestamp),
                duration_to_string(allowed_mismatch)
            )));
        }

        // A pre-signed URL must not be used after it expires.
        if let Some(expires) = self.expires() {
            let expires_at = req_ts.checked_add_signed(expires).unwrap_or(req_ts);
            if expires_at < server_timestamp {
                trace!("prevalidate: pre-signed URL expired at {}", expires_at);
                return Err(IdentityProofError::IdentityRejected {
                    status: StatusCode::FORBIDDEN,
                    message: format!("AccessDenied: Request has expired: {}", format_amz_date(&expires_at)),
                });
            }
        }

        // Credential scope must be correct for the region/service/date.
        let cscope = self.credential_scope();
        let mut cscope_errors = Vec::new();
        if cscope.region() != region {
            trace!("prevalidate: credential region '{}' does not match expected region '{}'", cscope.region(), region);
            cscope_errors.push(format!("Credential should be scoped to a valid region, not '{}'.", cscope.region()));
        }

        if cscope.service() != service {
            trace!(
                "prevalidate: credential service '{}' does not match expected service '{}'",
                cscope.service(),
                service
            );
            cscope_errors.push(format!("Credential should be scoped to correct service: '{}'.", service));
        }

        if cscope.date() != req_ts.date_naive() {
            let cscope_date = cscope.date().format(ISO8601_DATE_FORMAT).to_string();
            let expected_cscope_date = req_ts.format(ISO8601_DATE_FORMAT).to_string();
            trace!(
                "prevalidate: credential date '{}' does not match expected date '{}'",
                cscope_date,
                expected_cscope_date
            );
            cscope_errors.push(format!("Date in Credential scope does not match YYYYMMDD from ISO-8601 version of date from HTTP: '{}' != '{}', from '{}'.", cscope_date, expected_cscope_date, format_amz_date(&req_ts)));
        }

        if !cscope_errors.is_empty() {
            return Err(signature_does_not_match(cscope_errors.join(" ")));
        }

        Ok(())
    }

    /// Return the string to sign for the request.
    pub fn get_string_to_sign(&self) -> Vec<u8> {
        let scope = self.credential_scope().to_string();
        string_to_sign(&self.request_timestamp(), &scope, &self.canonical_request_sha256())
    }

    /// Validate the request signature against the secret key for [access_key][Self::access_key].
    pub fn validate_signature(
        &self,
        region: &str,
        service: &str,
        server_timestamp: DateTime<Utc>,
        allowed_mismatch: Duration,
        secret_key: &KSecretKey,
    ) -> Result<(), IdentityProofError> {
        self.prevalidate(region, service, server_timestamp, allowed_mismatch)?;
        let string_to_sign = self.get_string_to_sign();
        trace!("String to sign:\n{}", String::from_utf8_lossy(string_to_sign.as_ref()));
        let expected_signature = secret_key.to_ksigning_for_scope(self.credential_scope()).sign(&string_to_sign);
        let expected_signature_bytes = expected_signature.as_bytes();
        let signature_bytes = self.signature().as_bytes();
        let is_equal: bool = signature_bytes.ct_eq(expected_signature_bytes).into();
        if !is_equal {
            trace!("Signature mismatch: expected '{}', got '{}'", expected_signature, self.signature());
            Err(signature_does_not_match(MSG_REQUEST_SIGNATURE_MISMATCH.to_string()))
        } else {
            Ok(())
        }
    }
}

impl Debug for SigV4Authenticator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SigV4Authenticator")
            .field("location", &self.location)
            .field("canonical_request_sha256", &hex::encode(self.canonical_request_sha256()))
            .field("access_key", &self.access_key())
            .field("credential_scope", &self.credential_scope().to_string())
            .field("signed_headers", &self.signed_headers())
            .field("session_token", &self.session_token().map(|_| "<redacted>"))
            .field("signature", &self.signature())
            .field("request_timestamp", &self.request_timestamp())
            .field("expires", &self.expires())
            .finish()
    }
}

/// Build the SigV4 string to sign: `AWS4-HMAC-SHA256\n<timestamp>\n<scope>\n<hex sha256(canonical request)>`.
pub(crate) fn string_to_sign(
    timestamp: &DateTime<Utc>,
    credential_scope: &str,
    canonical_request_sha256: &[u8; SHA256_OUTPUT_LEN],
) -> Vec<u8> {
    let mut result = Vec::with_capacity(
        AWS4_HMAC_SHA256.len() + 1 + ISO8601_UTC_LENGTH + 1 + credential_scope.len() + 1 + SHA256_HEX_LENGTH,
    );
    let hashed_canonical_request = hex::encode(canonical_request_sha256);

    result.extend(AWS4_HMAC_SHA256.as_bytes());
    result.push(b'\n');
    result.extend(format_amz_date(timestamp).as_bytes());
    result.push(b'\n');
    result.extend(credential_scope.as_bytes());
    result.push(b'\n');
    result.extend(hashed_canonical_request.as_bytes());
    result
}

/// Split `keyid/date/region/service/aws4_request` into the access key and credential scope.
fn split_credential(builder: &mut SigV4AuthenticatorBuilder, credential: &str) -> Result<(), IdentityProofError> {
    let credential_parts = credential.split('/').collect::<Vec<&str>>();
    if credential_parts.len() != 5 {
        debug!("Credential has {} parts, expected 5", credential_parts.len());
        return Err(IdentityProofError::MalformedPayload(format!(
            "{} got '{}'",
            MSG_CREDENTIAL_MUST_HAVE_FIVE_PARTS, credential
        )));
    }

    if credential_parts[0].is_empty() {
        return Err(IdentityProofError::MalformedPayload("Credential access key is empty".to_string()));
    }

    let (access_key, scope) = credential.split_once('/').unwrap_or((credential, ""));
    builder.access_key(access_key.to_string());
    builder.credential_scope(CredentialScope::from_str(scope)?);
    Ok(())
}

/// Parse the `Authorization` header. The header value has already been normalized by the canonicalizer.
fn parameters_from_auth_header(
    auth_header: &[u8],
    headers: &HashMap<String, Vec<Vec<u8>>>,
) -> Result<(SigV4AuthenticatorBuilder, Vec<String>, String), IdentityProofError> {
    let auth_header = trim_ascii(auth_header);

    // Make sure the Authorization header starts with "AWS4-HMAC-SHA256".
    let (algorithm, parameters) = match auth_header.iter().position(|c| *c == b' ') {
        Some(pos) => (&auth_header[..pos], &auth_header[pos + 1..]),
        None => (auth_header, &b""[..]),
    };

    if algorithm != AWS4_HMAC_SHA256_BYTES {
        return Err(IdentityProofError::MalformedPayload(format!(
            "{}'{}'.",
            MSG_UNSUPPORTED_ALGORITHM,
            latin1_to_string(algorithm)
        )));
    }

    // Split the parameters by commas; trim each one; then split into key=value pairs.
    let mut parameter_map = HashMap::new();
    for parameter_untrimmed in parameters.split(|c| *c == b',') {
        let parameter = trim_ascii(parameter_untrimmed);

        // Needed if we have no parameters at all; this loop will always run at least once.
        if parameter.is_empty() {
            continue;
        }

        let Some(pos) = parameter.iter().position(|c| *c == b'=') else {
            return Err(IdentityProofError::MalformedPayload(format!(
                "'{}' not a valid key=value pair (missing equal-sign) in Authorization header: '{}'",
                latin1_to_string(parameter),
                latin1_to_string(auth_header)
            )));
        };

        // Use the last value for each key; overwriting is ok.
        parameter_map.insert(&parameter[..pos], &parameter[pos + 1..]);
    }

    let mut missing_messages = Vec::new();
    let mut builder = SigV4Authenticator::builder();
    builder.location(AuthenticationLocation::Header);

    let credential = match parameter_map.get(CREDENTIAL) {
        Some(credential) => Some(latin1_to_string(credential)),
        None => {
            missing_messages.push(MSG_AUTH_HEADER_REQ_CREDENTIAL);
            None
        }
    };

    if let Some(signature) = parameter_map.get(SIGNATURE) {
        builder.signature(latin1_to_string(signature));
    } else {
        missing_messages.push(MSG_AUTH_HEADER_REQ_SIGNATURE);
    }

    let mut signed_headers: Vec<String> = if let Some(signed_headers) = parameter_map.get(SIGNED_HEADERS) {
        signed_headers.split(|c| *c == b';').map(latin1_to_string).collect()
    } else {
        missing_messages.push(MSG_AUTH_HEADER_REQ_SIGNED_HEADERS);
        Vec::new()
    };
    signed_headers.sort();

    // Use the first X-Amz-Date header.
    let timestamp_str = headers.get(HDR_X_AMZ_DATE).map(|date| latin1_to_string(&date[0]));
    if timestamp_str.is_none() {
        missing_messages.push("Authorization header requires existence of 'X-Amz-Date' header.");
    }

    if !missing_messages.is_empty() {
        return Err(IdentityProofError::MalformedPayload(format!(
            "{} Authorization={}",
            missing_messages.join(" "),
            latin1_to_string(algorithm)
        )));
    }

    if let Some(credential) = credential {
        split_credential(&mut builder, &credential)?;
    }

    // Get the session token if present.
    if let Some(token) = headers.get(HDR_X_AMZ_SECURITY_TOKEN) {
        builder.session_token(latin1_to_string(&token[0]));
    }

    Ok((builder, signed_headers, timestamp_str.unwrap_or_default()))
}

/// Parse the `X-Amz-*` query parameters of a pre-signed URL. Values have already been normalized by the canonicalizer.
fn parameters_from_query(
    query_alg: &str,
    query_parameters: &HashMap<String, Vec<String>>,
) -> Result<(SigV4AuthenticatorBuilder, Vec<String>, String), IdentityProofError> {
    if query_alg != AWS4_HMAC_SHA256 {
        return Err(IdentityProofError::MalformedPayload(format!("{}'{}'.", MSG_UNSUPPORTED_ALGORITHM, query_alg)));
    }

    let first = |name: &str| query_parameters.get(name).and_then(|values| unescape_uri_encoding(&values[0]));

    let mut missing = Vec::new();
    let mut builder = SigV4Authenticator::builder();
    builder.location(AuthenticationLocation::QueryString);

    let credential = first(QP_X_AMZ_CREDENTIAL);
    if credential.is_none() {
        missing.push(QP_X_AMZ_CREDENTIAL);
    }

    match first(QP_X_AMZ_SIGNATURE) {
        Some(signature) => {
            builder.signature(signature);
        }
        None => missing.push(QP_X_AMZ_SIGNATURE),
    }

    let mut signed_headers = match first(QP_X_AMZ_SIGNED_HEADERS) {
        Some(signed_headers) => signed_headers.split(';').map(|s| s.to_string()).collect::<Vec<String>>(),
        None => {
            missing.push(QP_X_AMZ_SIGNED_HEADERS);
            Vec::new()
        }
    };
    signed_headers.sort();

    let timestamp_str = first(QP_X_AMZ_DATE);
    if timestamp_str.is_none() {
        missing.push(QP_X_AMZ_DATE);
    }

    if let Some(expires) = first(QP_X_AMZ_EXPIRES) {
        let secs = expires.parse::<u32>().map_err(|_| {
            IdentityProofError::MalformedPayload(format!("X-Amz-Expires must be a non-negative integer: '{}'", expires))
        })?;
        builder.expires(Duration::seconds(secs as i64));
    } else {
        missing.push(QP_X_AMZ_EXPIRES);
    }

    if !missing.is_empty() {
        return Err(IdentityProofError::MalformedPayload(format!(
            "AWS query-string parameters must include {}. Re-examine the query-string parameters.",
            missing.iter().map(|p| format!("'{}'", p)).collect::<Vec<String>>().join(", ")
        )));
    }

    if let Some(credential) = credential {
        split_credential(&mut builder, &credential)?;
    }

    if let Some(token) = first(QP_X_AMZ_SECURITY_TOKEN) {
        builder.session_token(token);
    }

    Ok((builder, signed_headers, timestamp_str.unwrap_or_default()))
}

fn signature_does_not_match(message: String) -> IdentityProofError {
    debug!("SignatureDoesNotMatch: {}", message);
    IdentityProofError::IdentityRejected {
        status: StatusCode::FORBIDDEN,
        message: format!("SignatureDoesNotMatch: {}", message),
    }
}

fn duration_to_string(duration: Duration) -> String {
    let secs = duration.num_seconds();
    if secs % 60 == 0 {
        format!("{} min", duration.num_minutes())
    } else {
        format!("{} sec", secs)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::duration_to_string,
        crate::{
            auth::{AuthenticationLocation, SigV4Authenticator},
            IdentityProofError, KSecretKey, SignedRequest,
        },
        bytes::Bytes,
        chrono::{Duration, TimeZone, Utc},
        http::{
            header::{HeaderMap, HeaderValue},
            method::Method,
            uri::Uri,
        },
        std::str::FromStr,
    };

    macro_rules! expect_err {
        ($test:expr, $expected:ident) => {
            match $test {
                Ok(ref v) => panic!("Expected Err({}); got Ok({:?})", stringify!($expected), v),
                Err(ref e) => match e {
                    IdentityProofError::$expected(_) => e.to_string(),
                    _ => panic!("Expected {}; got {:#?}: {}", stringify!($expected), &e, &e),
                },
            }
        };
    }

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn sts_get_request(authorization: &'static str) -> SignedRequest {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("sts.us-east-1.amazonaws.com"));
        headers.insert("x-amz-date", HeaderValue::from_static("20150830T123600Z"));
        headers.insert("authorization", HeaderValue::from_static(authorization));
        SignedRequest::new(
            Method::GET,
            Uri::from_static("https://sts.us-east-1.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15"),
            headers,
            Bytes::new(),
        )
        .unwrap()
    }

    const GOOD_AUTHORIZATION: &str = "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/sts/aws4_request, SignedHeaders=host;x-amz-date, Signature=b818e10e31717fbcef99fdc263bf5929590f326b83ce32cd4aa5083c64039076";

    #[test_log::test]
    fn test_header_parameters() {
        let auth = SigV4Authenticator::from_signed_request(&sts_get_request(GOOD_AUTHORIZATION)).unwrap();
        assert_eq!(auth.location(), AuthenticationLocation::Header);
        assert_eq!(auth.access_key(), "AKIDEXAMPLE");
        assert_eq!(auth.credential_scope().to_string(), "20150830/us-east-1/sts/aws4_request");
        assert_eq!(auth.signed_headers(), &["host".to_string(), "x-amz-date".to_string()]);
        assert_eq!(auth.request_timestamp(), Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap());
        assert!(auth.session_token().is_none());
        assert!(auth.expires().is_none());
        assert_eq!(
            hex::encode(auth.canonical_request_sha256()),
            "d87d471276b2c130cdf37d886373c1b9c2ca94686799ec8edca4708d4949ae46"
        );

        let _ = format!("{:?}", auth);
    }

    #[test_log::test]
    fn test_validate_signature() {
        let auth = SigV4Authenticator::from_signed_request(&sts_get_request(GOOD_AUTHORIZATION)).unwrap();
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 30).unwrap();
        let secret = KSecretKey::from_str(SECRET).unwrap();
        auth.validate_signature("us-east-1", "sts", now, Duration::minutes(5), &secret).unwrap();

        let wrong_secret = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG+bPxRfiCZEXAMPLEKEY").unwrap();
        match auth.validate_signature("us-east-1", "sts", now, Duration::minutes(5), &wrong_secret) {
            Err(IdentityProofError::IdentityRejected {
                status,
                message,
            }) => {
                assert_eq!(status, 403);
                assert!(message.starts_with("SignatureDoesNotMatch: The request signature we calculated"));
            }
            other => panic!("Expected IdentityRejected; got {:?}", other),
        }
    }

    #[test_log::test]
    fn test_prevalidate_rejections() {
        let auth = SigV4Authenticator::from_signed_request(&sts_get_request(GOOD_AUTHORIZATION)).unwrap();
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let mismatch = Duration::minutes(15);

        let message = |r: Result<(), IdentityProofError>| match r {
            Err(IdentityProofError::IdentityRejected {
                message,
                ..
            }) => message,
            other => panic!("Expected IdentityRejected; got {:?}", other),
        };

        let m = message(auth.prevalidate("us-east-1", "sts", now + Duration::minutes(16), mismatch));
        assert_eq!(m, "SignatureDoesNotMatch: Signature expired: 20150830T123600Z is now earlier than 20150830T123700Z (20150830T125200Z - 15 min.)");

        let m = message(auth.prevalidate("us-east-1", "sts", now - Duration::seconds(901), mismatch));
        assert_eq!(m, "SignatureDoesNotMatch: Signature not yet current: 20150830T123600Z is still later than 20150830T123559Z (20150830T122059Z + 15 min.)");

        let m = message(auth.prevalidate("us-west-2", "sts", now, mismatch));
        assert_eq!(m, "SignatureDoesNotMatch: Credential should be scoped to a valid region, not 'us-east-1'.");

        let m = message(auth.prevalidate("us-east-1", "iam", now, mismatch));
        assert_eq!(m, "SignatureDoesNotMatch: Credential should be scoped to correct service: 'iam'.");
    }

    #[test_log::test]
    fn test_malformed_header() {
        let e = expect_err!(
            SigV4Authenticator::from_signed_request(&sts_get_request("AWS3-HMAC-SHA256 Credential=x")),
            MalformedPayload
        );
        assert_eq!(e, "Unsupported AWS 'algorithm': 'AWS3-HMAC-SHA256'.");

        let request = sts_get_request("AWS4-HMAC-SHA256");
        let e = expect_err!(SigV4Authenticator::from_signed_request(&request), MalformedPayload);
        assert_eq!(e, "Authorization header requires 'Credential' parameter. Authorization header requires 'Signature' parameter. Authorization header requires 'SignedHeaders' parameter. Authorization=AWS4-HMAC-SHA256");

        let e = expect_err!(
            SigV4Authenticator::from_signed_request(&sts_get_request(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/sts/aws4_request, SignedHeaders=host;x-amz-date, Signature"
            )),
            MalformedPayload
        );
        assert!(e.starts_with("'Signature' not a valid key=value pair (missing equal-sign)"));

        let e = expect_err!(
            SigV4Authenticator::from_signed_request(&sts_get_request(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/sts, SignedHeaders=host;x-amz-date, Signature=abcd"
            )),
            MalformedPayload
        );
        assert_eq!(e, "Credential must have exactly 5 slash-delimited elements, e.g. keyid/date/region/service/term, got 'AKIDEXAMPLE/20150830/us-east-1/sts'");

        let e = expect_err!(
            SigV4Authenticator::from_signed_request(&sts_get_request(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/sts/aws4_request, SignedHeaders=x-amz-date, Signature=abcd"
            )),
            MalformedPayload
        );
        assert_eq!(e, "'Host' must be a 'SignedHeader' in the AWS Authorization.");
    }

    #[test_log::test]
    fn test_missing_authentication() {
        let mut req = sts_get_request(GOOD_AUTHORIZATION);
        req.headers_mut().remove("authorization");
        let e = expect_err!(SigV4Authenticator::from_signed_request(&req), MalformedPayload);
        assert_eq!(e, "Request is missing Authentication Token");
    }

    #[test_log::test]
    fn test_query_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("sts.us-east-1.amazonaws.com"));
        let req = SignedRequest::new(
            Method::GET,
            Uri::from_static("https://sts.us-east-1.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15&X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Credential=AKIDEXAMPLE%2F20150830%2Fus-east-1%2Fsts%2Faws4_request&X-Amz-Date=20150830T123600Z&X-Amz-Expires=60&X-Amz-SignedHeaders=host&X-Amz-Signature=abcd"),
            headers.clone(),
            Bytes::new(),
        )
        .unwrap();

        let auth = SigV4Authenticator::from_signed_request(&req).unwrap();
        assert_eq!(auth.location(), AuthenticationLocation::QueryString);
        assert_eq!(auth.access_key(), "AKIDEXAMPLE");
        assert_eq!(auth.signed_headers(), &["host".to_string()]);
        assert_eq!(auth.expires(), Some(Duration::seconds(60)));
        assert_eq!(auth.signature(), "abcd");

        // Expired URL.
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 37, 1).unwrap();
        match auth.prevalidate("us-east-1", "sts", now, Duration::minutes(15)) {
            Err(IdentityProofError::IdentityRejected {
                message,
                ..
            }) => assert_eq!(message, "AccessDenied: Request has expired: 20150830T123700Z"),
            other => panic!("Expected IdentityRejected; got {:?}", other),
        }

        let req = SignedRequest::new(
            Method::GET,
            Uri::from_static("https://sts.us-east-1.amazonaws.com/?Action=GetCallerIdentity&X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Date=20150830T123600Z"),
            headers,
            Bytes::new(),
        )
        .unwrap();
        let e = expect_err!(SigV4Authenticator::from_signed_request(&req), MalformedPayload);
        assert_eq!(e, "AWS query-string parameters must include 'X-Amz-Credential', 'X-Amz-Signature', 'X-Amz-SignedHeaders', 'X-Amz-Expires'. Re-examine the query-string parameters.");
    }

    #[test_log::test]
    fn test_bad_timestamp() {
        let mut req = sts_get_request(GOOD_AUTHORIZATION);
        req.headers_mut().insert("x-amz-date", HeaderValue::from_static("2015-08-30T12:36:00Z"));
        let e = expect_err!(SigV4Authenticator::from_signed_request(&req), MalformedPayload);
        assert_eq!(
            e,
            "Date must be in ISO-8601 'basic format'. Got '2015-08-30T12:36:00Z'. See http://en.wikipedia.org/wiki/ISO_8601"
        );
    }

    #[test_log::test]
    fn test_duration_formatting() {
        assert_eq!(duration_to_string(Duration::seconds(32)).as_str(), "32 sec");
        assert_eq!(duration_to_string(Duration::seconds(60)).as_str(), "1 min");
        assert_eq!(duration_to_string(Duration::seconds(61)).as_str(), "61 sec");
        assert_eq!(duration_to_string(Duration::seconds(600)).as_str(), "10 min");
    }
}
