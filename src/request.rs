use {
    crate::{canonical::CanonicalRequest, constants::*, IdentityProofError},
    bytes::Bytes,
    http::{
        header::{HeaderMap, HeaderName, HeaderValue},
        method::Method,
        request::Request,
        uri::Uri,
    },
    std::fmt::{Debug, Formatter, Result as FmtResult},
};

/// A fully-formed, signed STS request: exactly what the signer produced and exactly what the verifier replays.
///
/// Header values are kept byte-for-byte; a header may carry multiple values.
#[derive(Clone)]
pub struct SignedRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

impl SignedRequest {
    /// Assemble a signed request from its parts.
    ///
    /// # Errors
    /// Returns [`IdentityProofError::MalformedPayload`] if `uri` is not absolute.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Result<Self, IdentityProofError> {
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(IdentityProofError::MalformedPayload(format!("Request URL is not absolute: {}", uri)));
        }

        Ok(Self {
            method,
            uri,
            headers,
            body,
        })
    }

    /// Rebuild a replayable request from a pre-signed `GET` URL.
    ///
    /// `extra_headers` are the headers that were signed alongside `host` (for example `x-k8s-aws-id`); the `Host`
    /// header is taken from the URL.
    pub fn from_presigned_url(url: &str, extra_headers: &HeaderMap) -> Result<Self, IdentityProofError> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| IdentityProofError::MalformedPayload(format!("Invalid pre-signed URL: {}", e)))?;

        let authority = match uri.authority() {
            Some(authority) => authority.as_str().to_string(),
            None => {
                return Err(IdentityProofError::MalformedPayload(format!("Pre-signed URL is not absolute: {}", url)))
            }
        };

        let mut headers = extra_headers.clone();
        let host = HeaderValue::from_str(&authority)
            .map_err(|e| IdentityProofError::MalformedPayload(format!("Invalid host in pre-signed URL: {}", e)))?;
        headers.insert(HeaderName::from_static(HDR_HOST), host);

        Self::new(Method::GET, uri, headers, Bytes::new())
    }

    /// The HTTP method.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The absolute request URL.
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request headers, including `Authorization`.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The request body.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The host the request is addressed to, without a port.
    #[inline]
    pub fn host(&self) -> Option<&str> {
        self.uri.host()
    }

    /// Canonicalize this request.
    pub fn canonical_request(&self) -> Result<CanonicalRequest, IdentityProofError> {
        CanonicalRequest::from_parts(&self.method, &self.uri, &self.headers, &self.body)
    }

    /// Split this request into its method, URL, headers, and body.
    pub fn into_parts(self) -> (Method, Uri, HeaderMap, Bytes) {
        (self.method, self.uri, self.headers, self.body)
    }
}

impl Debug for SignedRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut headers = self.headers.clone();
        if headers.contains_key(HDR_X_AMZ_SECURITY_TOKEN) {
            headers.insert(HeaderName::from_static(HDR_X_AMZ_SECURITY_TOKEN), HeaderValue::from_static("<redacted>"));
        }

        f.debug_struct("SignedRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

impl From<SignedRequest> for Request<Bytes> {
    fn from(request: SignedRequest) -> Self {
        let (method, uri, headers, body) = request.into_parts();
        let mut result = Request::new(body);
        *result.method_mut() = method;
        *result.uri_mut() = uri;
        *result.headers_mut() = headers;
        result
    }
}

impl TryFrom<Request<Bytes>> for SignedRequest {
    type Error = IdentityProofError;

    fn try_from(request: Request<Bytes>) -> Result<Self, Self::Error> {
        let (parts, body) = request.into_parts();
        Self::new(parts.method, parts.uri, parts.headers, body)
    }
}

#[cfg(test)]
mod tests {
    use {
        crate::{IdentityProofError, SignedRequest},
        bytes::Bytes,
        http::{header::HeaderMap, method::Method, request::Request, uri::Uri, HeaderValue},
    };

    #[test_log::test]
    fn test_http_request_conversion() {
        let mut headers = HeaderMap::new();
        headers.append("x-multi", HeaderValue::from_static("b"));
        headers.append("x-multi", HeaderValue::from_static("a"));
        let req = SignedRequest::new(
            Method::POST,
            Uri::from_static("https://sts.amazonaws.com/"),
            headers,
            Bytes::from_static(b"Action=GetCallerIdentity&Version=2011-06-15"),
        )
        .unwrap();

        let http_req: Request<Bytes> = req.clone().into();
        assert_eq!(*http_req.method(), Method::POST);
        assert_eq!(http_req.uri(), "https://sts.amazonaws.com/");
        let values: Vec<&HeaderValue> = http_req.headers().get_all("x-multi").iter().collect();
        assert_eq!(values, vec!["b", "a"]);

        let back = SignedRequest::try_from(http_req).unwrap();
        assert_eq!(back.body(), req.body());
        assert_eq!(back.host(), Some("sts.amazonaws.com"));
    }

    #[test_log::test]
    fn test_relative_uri_rejected() {
        let e = SignedRequest::new(Method::GET, Uri::from_static("/"), HeaderMap::new(), Bytes::new()).unwrap_err();
        assert!(matches!(e, IdentityProofError::MalformedPayload(_)));
        assert_eq!(e.to_string(), "Request URL is not absolute: /");
    }

    #[test_log::test]
    fn test_from_presigned_url() {
        let mut extra = HeaderMap::new();
        extra.insert("x-k8s-aws-id", HeaderValue::from_static("my-cluster"));
        let req = SignedRequest::from_presigned_url(
            "https://sts.us-west-2.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15",
            &extra,
        )
        .unwrap();
        assert_eq!(*req.method(), Method::GET);
        assert_eq!(req.headers()["host"], "sts.us-west-2.amazonaws.com");
        assert_eq!(req.headers()["x-k8s-aws-id"], "my-cluster");
        assert!(req.body().is_empty());

        assert!(SignedRequest::from_presigned_url("/?Action=GetCallerIdentity", &extra).is_err());
        assert!(SignedRequest::from_presigned_url("not a url", &extra).is_err());
    }

    #[test_log::test]
    fn test_debug_redacts_session_token() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-security-token", HeaderValue::from_static("top-secret-token"));
        let req = SignedRequest::new(Method::GET, Uri::from_static("https://sts.amazonaws.com/"), headers, Bytes::new())
            .unwrap();
        let debug = format!("{:?}", req);
        assert!(!debug.contains("top-secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
