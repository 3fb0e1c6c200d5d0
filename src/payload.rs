use {
    crate::{constants::*, endpoints::looks_like_sts_host, IdentityProofError, SignedRequest},
    base64::{
        engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
        Engine,
    },
    bytes::Bytes,
    http::{
        header::{HeaderMap, HeaderName, HeaderValue},
        method::Method,
        uri::Uri,
    },
    log::debug,
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        fmt::{Debug, Formatter, Result as FmtResult},
    },
};

/// The Vault-compatible identity proof envelope.
///
/// ```json
/// {
///   "iam_http_request_method": "POST",
///   "iam_request_url": "aHR0cHM6Ly9zdHMuYW1hem9uYXdzLmNvbS8=",
///   "iam_request_body": "QWN0aW9uPUdldENhbGxlcklkZW50aXR5JlZlcnNpb249MjAxMS0wNi0xNQ==",
///   "iam_request_headers": { "Authorization": ["AWS4-HMAC-SHA256 ..."], ... }
/// }
/// ```
///
/// The URL and body are standard base64. Header values are carried verbatim.
#[derive(Clone, Deserialize, PartialEq, Eq, Serialize)]
pub struct AwsAuthIamPayload {
    iam_http_request_method: String,
    iam_request_url: String,
    iam_request_body: String,
    iam_request_headers: BTreeMap<String, Vec<String>>,
}

impl AwsAuthIamPayload {
    /// Wrap a signed request in the envelope.
    ///
    /// # Errors
    /// Returns [`IdentityProofError::MalformedPayload`] if a header value is not visible ASCII.
    pub fn from_signed_request(request: &SignedRequest) -> Result<Self, IdentityProofError> {
        let mut headers = BTreeMap::<String, Vec<String>>::new();
        for (name, value) in request.headers() {
            let value = value.to_str().map_err(|_| {
                IdentityProofError::MalformedPayload(format!("Header '{}' cannot be carried in a payload", name))
            })?;
            headers.entry(name.as_str().to_string()).or_default().push(value.to_string());
        }

        Ok(Self {
            iam_http_request_method: request.method().as_str().to_string(),
            iam_request_url: STANDARD.encode(request.uri().to_string()),
            iam_request_body: STANDARD.encode(request.body()),
            iam_request_headers: headers,
        })
    }

    /// The HTTP method, `GET` or `POST`.
    #[inline]
    pub fn method(&self) -> &str {
        &self.iam_http_request_method
    }

    /// The base64-encoded request URL.
    #[inline]
    pub fn encoded_url(&self) -> &str {
        &self.iam_request_url
    }

    /// The base64-encoded request body.
    #[inline]
    pub fn encoded_body(&self) -> &str {
        &self.iam_request_body
    }

    /// The request headers.
    #[inline]
    pub fn headers(&self) -> &BTreeMap<String, Vec<String>> {
        &self.iam_request_headers
    }

    /// Serialize the envelope as JSON.
    pub fn to_json(&self) -> String {
        // Every field is a string or a map of strings; this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Serialize the envelope as an opaque token: standard base64 of the JSON.
    pub fn to_token(&self) -> String {
        STANDARD.encode(self.to_json())
    }

    /// Parse the JSON envelope.
    pub fn from_json(json: &str) -> Result<Self, IdentityProofError> {
        serde_json::from_str(json).map_err(|e| {
            debug!("Unable to parse identity proof envelope: {}", e);
            IdentityProofError::MalformedPayload(format!("Invalid identity proof envelope: {}", e))
        })
    }

    /// Parse an opaque token produced by [to_token][Self::to_token].
    pub fn from_token(token: &str) -> Result<Self, IdentityProofError> {
        let json = decode_base64_utf8(token.trim(), "token")?;
        Self::from_json(&json)
    }

    /// Rebuild the signed request so it can be replayed.
    ///
    /// # Errors
    /// Returns [`IdentityProofError::MalformedPayload`] if the method is not `GET` or `POST`, the URL or body is not
    /// valid base64, the URL is not an absolute `https` URL to an STS endpoint, a header is invalid, or the
    /// `Authorization`, `X-Amz-Date`, or `Host` header is missing.
    pub fn into_signed_request(&self) -> Result<SignedRequest, IdentityProofError> {
        let method = match self.iam_http_request_method.as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            other => {
                return Err(IdentityProofError::MalformedPayload(format!(
                    "Unsupported request method: '{}'",
                    other.escape_default()
                )))
            }
        };

        let url = decode_base64_utf8(&self.iam_request_url, "iam_request_url")?;
        let uri = url
            .parse::<Uri>()
            .map_err(|e| IdentityProofError::MalformedPayload(format!("Invalid request URL '{}': {}", url, e)))?;
        check_sts_url(&uri)?;

        let body = STANDARD
            .decode(&self.iam_request_body)
            .map_err(|e| IdentityProofError::MalformedPayload(format!("Invalid base64 in iam_request_body: {}", e)))?;

        let mut headers = HeaderMap::new();
        for (name, values) in &self.iam_request_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                IdentityProofError::MalformedPayload(format!("Invalid header name: '{}'", name.escape_default()))
            })?;

            for value in values {
                let value = HeaderValue::from_str(value).map_err(|_| {
                    IdentityProofError::MalformedPayload(format!("Invalid value for header '{}'", name))
                })?;
                headers.append(name.clone(), value);
            }
        }

        for required in [HDR_AUTHORIZATION, HDR_X_AMZ_DATE, HDR_HOST] {
            if !headers.contains_key(required) {
                return Err(IdentityProofError::MalformedPayload(format!("Missing required header: {}", required)));
            }
        }

        SignedRequest::new(method, uri, headers, Bytes::from(body))
    }
}

impl Debug for AwsAuthIamPayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let headers: BTreeMap<&String, Vec<&str>> = self
            .iam_request_headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case(HDR_X_AMZ_SECURITY_TOKEN) {
                    (k, v.iter().map(|_| "<redacted>").collect())
                } else {
                    (k, v.iter().map(|s| s.as_str()).collect())
                }
            })
            .collect();

        f.debug_struct("AwsAuthIamPayload")
            .field("iam_http_request_method", &self.iam_http_request_method)
            .field("iam_request_url", &self.iam_request_url)
            .field("iam_request_body", &self.iam_request_body)
            .field("iam_request_headers", &headers)
            .finish()
    }
}

impl TryFrom<&SignedRequest> for AwsAuthIamPayload {
    type Error = IdentityProofError;

    fn try_from(request: &SignedRequest) -> Result<Self, Self::Error> {
        Self::from_signed_request(request)
    }
}

/// Encode a pre-signed URL as an `aws-iam-authenticator` style Kubernetes bearer token.
pub fn encode_kubernetes_token(presigned_url: &str) -> String {
    format!("{}{}", KUBERNETES_TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(presigned_url))
}

/// Decode a Kubernetes bearer token back into the pre-signed URL it carries.
pub fn decode_kubernetes_token(token: &str) -> Result<String, IdentityProofError> {
    let Some(encoded) = token.strip_prefix(KUBERNETES_TOKEN_PREFIX) else {
        return Err(IdentityProofError::MalformedPayload(format!(
            "Kubernetes token must start with '{}'",
            KUBERNETES_TOKEN_PREFIX
        )));
    };

    let decoded = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| IdentityProofError::MalformedPayload(format!("Invalid base64 in Kubernetes token: {}", e)))?;

    let url = String::from_utf8(decoded)
        .map_err(|_| IdentityProofError::MalformedPayload("Kubernetes token is not valid UTF-8".to_string()))?;
    check_sts_url(
        &url.parse::<Uri>()
            .map_err(|e| IdentityProofError::MalformedPayload(format!("Invalid URL in Kubernetes token: {}", e)))?,
    )?;

    Ok(url)
}

fn decode_base64_utf8(value: &str, what: &str) -> Result<String, IdentityProofError> {
    let decoded = STANDARD
        .decode(value)
        .map_err(|e| IdentityProofError::MalformedPayload(format!("Invalid base64 in {}: {}", what, e)))?;
    String::from_utf8(decoded)
        .map_err(|_| IdentityProofError::MalformedPayload(format!("{} is not valid UTF-8", what)))
}

/// The URL must be absolute `https` to something shaped like an STS endpoint, on the default port.
fn check_sts_url(uri: &Uri) -> Result<(), IdentityProofError> {
    if uri.scheme_str() != Some("https") {
        return Err(IdentityProofError::MalformedPayload(format!("Request URL is not an https URL: {}", uri)));
    }

    let Some(authority) = uri.authority() else {
        return Err(IdentityProofError::MalformedPayload(format!("Request URL is not absolute: {}", uri)));
    };

    if authority.port().is_some() || !looks_like_sts_host(authority.host()) {
        return Err(IdentityProofError::MalformedPayload(format!(
            "Request URL does not address an STS endpoint: {}",
            authority
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        crate::{
            decode_kubernetes_token, encode_kubernetes_token, AwsAuthIamPayload, AwsCredentials,
            GetCallerIdentitySigner, IdentityProofError, RequestStyle, SignedRequest,
        },
        bytes::Bytes,
        chrono::{TimeZone, Utc},
        http::{
            header::{HeaderMap, HeaderValue},
            method::Method,
            uri::Uri,
        },
        serde_json::json,
    };

    fn signed(style: RequestStyle) -> SignedRequest {
        let credentials = AwsCredentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            Some("session-token".to_string()),
        )
        .unwrap();
        GetCallerIdentitySigner::builder()
            .style(style)
            .header("X-Vault-AWS-IAM-Server-ID", "vault.example.com")
            .build()
            .unwrap()
            .sign_at(&credentials, Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap())
            .unwrap()
    }

    fn expect_malformed(r: Result<SignedRequest, IdentityProofError>) -> String {
        match r {
            Err(IdentityProofError::MalformedPayload(msg)) => msg,
            other => panic!("Expected MalformedPayload; got {:?}", other),
        }
    }

    #[test_log::test]
    fn test_round_trip() {
        for style in [RequestStyle::Get, RequestStyle::Post] {
            let request = signed(style);
            let payload = AwsAuthIamPayload::from_signed_request(&request).unwrap();

            let from_json = AwsAuthIamPayload::from_json(&payload.to_json()).unwrap();
            let from_token = AwsAuthIamPayload::from_token(&payload.to_token()).unwrap();
            assert_eq!(from_json, payload);
            assert_eq!(from_token, payload);

            let rebuilt = from_token.into_signed_request().unwrap();
            assert_eq!(rebuilt.method(), request.method());
            assert_eq!(rebuilt.uri(), request.uri());
            assert_eq!(rebuilt.headers(), request.headers());
            assert_eq!(rebuilt.body(), request.body());
        }
    }

    #[test_log::test]
    fn test_envelope_shape() {
        let payload = AwsAuthIamPayload::from_signed_request(&signed(RequestStyle::Post)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload.to_json()).unwrap();
        assert_eq!(value["iam_http_request_method"], "POST");
        assert_eq!(value["iam_request_url"], "aHR0cHM6Ly9zdHMuYW1hem9uYXdzLmNvbS8=");
        assert_eq!(value["iam_request_body"], "QWN0aW9uPUdldENhbGxlcklkZW50aXR5JlZlcnNpb249MjAxMS0wNi0xNQ==");
        assert_eq!(value["iam_request_headers"]["x-vault-aws-iam-server-id"], json!(["vault.example.com"]));
        assert_eq!(payload.method(), "POST");
        assert_eq!(payload.encoded_url(), "aHR0cHM6Ly9zdHMuYW1hem9uYXdzLmNvbS8=");
        assert!(payload.headers().contains_key("authorization"));

        let debug = format!("{:?}", payload);
        assert!(!debug.contains("session-token"));
    }

    #[test_log::test]
    fn test_mixed_case_header_names_accepted() {
        let payload = AwsAuthIamPayload::from_signed_request(&signed(RequestStyle::Get)).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&payload.to_json()).unwrap();
        let headers = value["iam_request_headers"].as_object_mut().unwrap();
        let auth = headers.remove("authorization").unwrap();
        headers.insert("Authorization".to_string(), auth);

        let rebuilt = AwsAuthIamPayload::from_json(&value.to_string()).unwrap().into_signed_request().unwrap();
        assert!(rebuilt.headers().contains_key("authorization"));
    }

    #[test_log::test]
    fn test_malformed_payloads() {
        let payload = AwsAuthIamPayload::from_signed_request(&signed(RequestStyle::Get)).unwrap();
        let base: serde_json::Value = serde_json::from_str(&payload.to_json()).unwrap();

        let with = |f: &dyn Fn(&mut serde_json::Value)| {
            let mut v = base.clone();
            f(&mut v);
            AwsAuthIamPayload::from_json(&v.to_string()).unwrap().into_signed_request()
        };

        let msg = expect_malformed(with(&|v| v["iam_http_request_method"] = json!("DELETE")));
        assert_eq!(msg, "Unsupported request method: 'DELETE'");

        let msg = expect_malformed(with(&|v| v["iam_request_url"] = json!("not base64!")));
        assert!(msg.starts_with("Invalid base64 in iam_request_url"), "{}", msg);

        // http://sts.amazonaws.com/
        let msg = expect_malformed(with(&|v| v["iam_request_url"] = json!("aHR0cDovL3N0cy5hbWF6b25hd3MuY29tLw==")));
        assert_eq!(msg, "Request URL is not an https URL: http://sts.amazonaws.com/");

        // https://evil.example.com/
        let msg = expect_malformed(with(&|v| v["iam_request_url"] = json!("aHR0cHM6Ly9ldmlsLmV4YW1wbGUuY29tLw==")));
        assert_eq!(msg, "Request URL does not address an STS endpoint: evil.example.com");

        // https://sts.amazonaws.com:8443/
        let port_url = json!("aHR0cHM6Ly9zdHMuYW1hem9uYXdzLmNvbTo4NDQzLw==");
        let msg = expect_malformed(with(&|v| v["iam_request_url"] = port_url.clone()));
        assert_eq!(msg, "Request URL does not address an STS endpoint: sts.amazonaws.com:8443");

        for header in ["authorization", "x-amz-date", "host"] {
            let msg = expect_malformed(with(&|v| {
                v["iam_request_headers"].as_object_mut().unwrap().remove(header);
            }));
            assert_eq!(msg, format!("Missing required header: {}", header));
        }

        let msg = expect_malformed(with(&|v| v["iam_request_body"] = json!("%%%")));
        assert!(msg.starts_with("Invalid base64 in iam_request_body"));

        match AwsAuthIamPayload::from_json("{\"iam_http_request_method\": \"GET\"}") {
            Err(IdentityProofError::MalformedPayload(msg)) => {
                assert!(msg.starts_with("Invalid identity proof envelope"))
            }
            other => panic!("Expected MalformedPayload; got {:?}", other),
        }

        assert!(matches!(AwsAuthIamPayload::from_token("***"), Err(IdentityProofError::MalformedPayload(_))));
    }

    #[test_log::test]
    fn test_non_ascii_header_cannot_be_carried() {
        let mut headers = HeaderMap::new();
        headers.insert("x-odd", HeaderValue::from_bytes(b"caf\xe9").unwrap());
        let request =
            SignedRequest::new(Method::GET, Uri::from_static("https://sts.amazonaws.com/"), headers, Bytes::new())
                .unwrap();
        assert!(matches!(
            AwsAuthIamPayload::try_from(&request),
            Err(IdentityProofError::MalformedPayload(_))
        ));
    }

    #[test_log::test]
    fn test_kubernetes_token() {
        let url = "https://sts.us-east-1.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15&X-Amz-Algorithm=AWS4-HMAC-SHA256";
        let token = encode_kubernetes_token(url);
        assert!(token.starts_with("k8s-aws-v1."));
        assert!(!token.contains('='));
        assert!(!token.contains('+') && !token.contains('/'));
        assert_eq!(decode_kubernetes_token(&token).unwrap(), url);

        assert!(matches!(decode_kubernetes_token("k8s-aws-v2.abc"), Err(IdentityProofError::MalformedPayload(_))));
        assert!(matches!(decode_kubernetes_token("k8s-aws-v1.!!!"), Err(IdentityProofError::MalformedPayload(_))));

        let evil = encode_kubernetes_token("https://evil.example.com/?Action=GetCallerIdentity");
        assert!(matches!(decode_kubernetes_token(&evil), Err(IdentityProofError::MalformedPayload(_))));
    }
}
