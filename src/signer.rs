use {
    crate::{
        auth::string_to_sign,
        canonical::{uri_encode, CanonicalRequest},
        chronoutil::format_amz_date,
        constants::*,
        AwsCredentials, Clock, CredentialScope, CredentialSource, IdentityProofError, SignedRequest, StsEndpoint,
        StsEndpoints, SystemClock,
    },
    bytes::Bytes,
    chrono::{DateTime, Utc},
    derive_builder::Builder,
    http::{
        header::{HeaderMap, HeaderName, HeaderValue},
        method::Method,
        uri::Uri,
    },
    log::{debug, trace},
    std::{sync::Arc, time::Duration},
};

/// How the `GetCallerIdentity` call is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestStyle {
    /// `GET /?Action=GetCallerIdentity&Version=2011-06-15` with an empty body.
    #[default]
    Get,

    /// `POST /` with a form-encoded `Action=GetCallerIdentity&Version=2011-06-15` body. This is the form Vault's AWS
    /// IAM auth method expects.
    Post,
}

/// Builds and signs STS `GetCallerIdentity` requests without sending them.
///
/// ```
/// # use scratchstack_aws_identity_proof::{AwsCredentials, GetCallerIdentitySigner};
/// let signer = GetCallerIdentitySigner::builder()
///     .region("us-west-2")
///     .header("X-Vault-AWS-IAM-Server-ID", "vault.example.com")
///     .build()
///     .unwrap();
/// let credentials = AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", None).unwrap();
/// let request = signer.sign(&credentials).unwrap();
/// assert_eq!(request.host(), Some("sts.us-west-2.amazonaws.com"));
/// ```
#[derive(Builder, Clone, Debug)]
#[builder(derive(Debug))]
pub struct GetCallerIdentitySigner {
    /// The region to sign for. `None` uses the global endpoint, signed for `us-east-1`.
    #[builder(setter(into, strip_option), default)]
    region: Option<String>,

    /// Overrides the endpoint host from the endpoint table.
    #[builder(setter(into, strip_option), default)]
    endpoint_host: Option<String>,

    /// The region-to-endpoint table.
    #[builder(default = "StsEndpoints::aws_default()")]
    endpoints: Arc<StsEndpoints>,

    /// `GET` (default) or `POST`.
    #[builder(default)]
    style: RequestStyle,

    /// Additional headers to include and sign, in order.
    #[builder(setter(custom), default)]
    extra_headers: Vec<(String, String)>,

    /// The clock used by [sign][Self::sign] and [presign][Self::presign].
    #[builder(setter(custom), default = "Arc::new(SystemClock) as Arc<dyn Clock>")]
    clock: Arc<dyn Clock>,
}

impl GetCallerIdentitySignerBuilder {
    /// Add a header to sign, e.g. `X-Vault-AWS-IAM-Server-ID`. Names are case-insensitive.
    pub fn header<N, V>(&mut self, name: N, value: V) -> &mut Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.extra_headers.get_or_insert_with(Vec::new).push((name.into(), value.into()));
        self
    }

    /// Use `clock` instead of the system clock.
    pub fn clock<C: Clock + 'static>(&mut self, clock: C) -> &mut Self {
        self.clock = Some(Arc::new(clock));
        self
    }
}

impl Default for GetCallerIdentitySigner {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_host: None,
            endpoints: StsEndpoints::aws_default(),
            style: RequestStyle::default(),
            extra_headers: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// An unsigned request plus what is needed to sign it.
struct RequestTemplate {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    scope: CredentialScope,
}

impl GetCallerIdentitySigner {
    /// Create a [`GetCallerIdentitySignerBuilder`] to configure a signer.
    #[inline]
    pub fn builder() -> GetCallerIdentitySignerBuilder {
        GetCallerIdentitySignerBuilder::default()
    }

    /// The endpoint requests are addressed to.
    pub fn endpoint(&self) -> StsEndpoint {
        let resolved = self.endpoints.resolve(self.region.as_deref());
        match &self.endpoint_host {
            None => resolved,
            Some(host) => StsEndpoint::new(host.clone(), resolved.signing_region()),
        }
    }

    /// Sign a `GetCallerIdentity` request with the current time.
    pub fn sign(&self, credentials: &AwsCredentials) -> Result<SignedRequest, IdentityProofError> {
        self.sign_at(credentials, self.clock.now())
    }

    /// Read credentials from `source` once, then sign a `GetCallerIdentity` request with the current time.
    pub async fn sign_with_source<S>(&self, source: &S) -> Result<SignedRequest, IdentityProofError>
    where
        S: CredentialSource + ?Sized,
    {
        let credentials = source.credentials().await?;
        self.sign(&credentials)
    }

    /// Sign a `GetCallerIdentity` request as of `timestamp`.
    ///
    /// Every header present at signing time is signed. The result carries an
    /// `Authorization: AWS4-HMAC-SHA256 Credential=..., SignedHeaders=..., Signature=...` header.
    ///
    /// # Errors
    /// Returns [`IdentityProofError::Credential`] if the secret key is unusable, or
    /// [`IdentityProofError::Canonicalization`] if an extra header name or value is invalid.
    pub fn sign_at(
        &self,
        credentials: &AwsCredentials,
        timestamp: DateTime<Utc>,
    ) -> Result<SignedRequest, IdentityProofError> {
        let mut template = self.template(credentials, timestamp)?;
        let cr = CanonicalRequest::from_parts(&template.method, &template.uri, &template.headers, &template.body)?;
        let signed_headers = cr.default_signed_headers();
        let signature = self.signature(credentials, &template.scope, timestamp, &cr, &signed_headers)?;

        let authorization = format!(
            "{} {}={}/{}, {}={}, {}={}",
            AWS4_HMAC_SHA256,
            latin1(CREDENTIAL),
            credentials.access_key_id(),
            template.scope,
            latin1(SIGNED_HEADERS),
            signed_headers.join(";"),
            latin1(SIGNATURE),
            signature
        );
        template.headers.insert(HeaderName::from_static(HDR_AUTHORIZATION), header_value(&authorization)?);

        debug!("Signed GetCallerIdentity for {} with scope {}", credentials.access_key_id(), template.scope);
        SignedRequest::new(template.method, template.uri, template.headers, template.body)
    }

    /// Produce a pre-signed `GET` URL that is valid for `expires` from the current time.
    pub fn presign(
        &self,
        credentials: &AwsCredentials,
        expires: Option<Duration>,
    ) -> Result<String, IdentityProofError> {
        self.presign_at(credentials, expires, self.clock.now())
    }

    /// Produce a pre-signed `GET` URL as of `timestamp`. `expires` defaults to 60 seconds.
    ///
    /// The signed headers are `host` plus any extra headers; the caller must send the extra headers along with the
    /// URL.
    pub fn presign_at(
        &self,
        credentials: &AwsCredentials,
        expires: Option<Duration>,
        timestamp: DateTime<Utc>,
    ) -> Result<String, IdentityProofError> {
        let expires = expires.unwrap_or(Duration::from_secs(DEFAULT_PRESIGN_EXPIRES_SECS));
        let endpoint = self.endpoint();
        let scope = CredentialScope::for_sts(&timestamp, endpoint.signing_region());

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(HDR_HOST), header_value(endpoint.host())?);
        self.add_extra_headers(&mut headers)?;

        // Every header is signed, so the signed header list can be computed before the URL exists.
        let mut signed_headers: Vec<String> = headers.keys().map(|k| k.as_str().to_string()).collect();
        signed_headers.sort_unstable();
        signed_headers.dedup();

        let mut query = vec![
            (QP_ACTION, ACTION_GET_CALLER_IDENTITY.to_string()),
            (QP_VERSION, STS_VERSION.to_string()),
            (QP_X_AMZ_ALGORITHM, AWS4_HMAC_SHA256.to_string()),
            (QP_X_AMZ_CREDENTIAL, format!("{}/{}", credentials.access_key_id(), scope)),
            (QP_X_AMZ_DATE, format_amz_date(&timestamp)),
            (QP_X_AMZ_EXPIRES, expires.as_secs().to_string()),
            (QP_X_AMZ_SIGNED_HEADERS, signed_headers.join(";")),
        ];

        if let Some(token) = credentials.session_token() {
            query.push((QP_X_AMZ_SECURITY_TOKEN, token.to_string()));
        }

        let query = query.iter().map(|(k, v)| format!("{}={}", k, uri_encode(v))).collect::<Vec<String>>().join("&");
        let unsigned_url = format!("https://{}/?{}", endpoint.host(), query);
        let uri = parse_uri(&unsigned_url)?;

        let cr = CanonicalRequest::from_parts(&Method::GET, &uri, &headers, b"")?;
        let signature = self.signature(credentials, &scope, timestamp, &cr, &signed_headers)?;

        debug!("Pre-signed GetCallerIdentity for {} with scope {}", credentials.access_key_id(), scope);
        Ok(format!("{}&{}={}", unsigned_url, QP_X_AMZ_SIGNATURE, signature))
    }

    /// The canonical request that [sign_at][Self::sign_at] would sign, for audit and debugging.
    pub fn canonical_request_at(
        &self,
        credentials: &AwsCredentials,
        timestamp: DateTime<Utc>,
    ) -> Result<String, IdentityProofError> {
        let template = self.template(credentials, timestamp)?;
        let cr = CanonicalRequest::from_parts(&template.method, &template.uri, &template.headers, &template.body)?;
        let signed_headers = cr.default_signed_headers();
        Ok(String::from_utf8_lossy(&cr.canonical_request(&signed_headers)).into_owned())
    }

    /// Build the request to be signed: URL, body, and every header except `Authorization`.
    fn template(
        &self,
        credentials: &AwsCredentials,
        timestamp: DateTime<Utc>,
    ) -> Result<RequestTemplate, IdentityProofError> {
        let endpoint = self.endpoint();
        let scope = CredentialScope::for_sts(&timestamp, endpoint.signing_region());
        let mut headers = HeaderMap::new();

        let (method, uri, body) = match self.style {
            RequestStyle::Get => {
                let url = format!(
                    "https://{}/?{}={}&{}={}",
                    endpoint.host(),
                    QP_ACTION,
                    ACTION_GET_CALLER_IDENTITY,
                    QP_VERSION,
                    STS_VERSION
                );
                (Method::GET, parse_uri(&url)?, Bytes::new())
            }
            RequestStyle::Post => {
                headers.insert(
                    HeaderName::from_static(HDR_CONTENT_TYPE),
                    HeaderValue::from_static(APPLICATION_X_WWW_FORM_URLENCODED_UTF8),
                );
                let url = format!("https://{}/", endpoint.host());
                (Method::POST, parse_uri(&url)?, Bytes::from_static(GET_CALLER_IDENTITY_BODY.as_bytes()))
            }
        };

        headers.insert(HeaderName::from_static(HDR_HOST), header_value(endpoint.host())?);
        headers.insert(HeaderName::from_static(HDR_X_AMZ_DATE), header_value(&format_amz_date(&timestamp))?);
        if let Some(token) = credentials.session_token() {
            headers.insert(HeaderName::from_static(HDR_X_AMZ_SECURITY_TOKEN), header_value(token)?);
        }

        self.add_extra_headers(&mut headers)?;

        Ok(RequestTemplate {
            method,
            uri,
            headers,
            body,
            scope,
        })
    }

    fn add_extra_headers(&self, headers: &mut HeaderMap) -> Result<(), IdentityProofError> {
        for (name, value) in &self.extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                IdentityProofError::Canonicalization(format!("Invalid header name: '{}'", name.escape_default()))
            })?;

            // HeaderName lower-cases its input, so these comparisons are case-insensitive.
            if matches!(name.as_str(), HDR_AUTHORIZATION | HDR_HOST | HDR_X_AMZ_DATE | HDR_X_AMZ_SECURITY_TOKEN) {
                return Err(IdentityProofError::Canonicalization(format!(
                    "The {} header is set by the signer and cannot be supplied",
                    name
                )));
            }

            headers.append(name, header_value(value)?);
        }

        Ok(())
    }

    fn signature(
        &self,
        credentials: &AwsCredentials,
        scope: &CredentialScope,
        timestamp: DateTime<Utc>,
        cr: &CanonicalRequest,
        signed_headers: &[String],
    ) -> Result<String, IdentityProofError> {
        let cr_hash = cr.canonical_request_sha256(signed_headers);
        let string_to_sign = string_to_sign(&timestamp, &scope.to_string(), &cr_hash);
        trace!("String to sign:\n{}", String::from_utf8_lossy(&string_to_sign));
        let signing_key = credentials.secret_key()?.to_ksigning_for_scope(scope);
        Ok(signing_key.sign(&string_to_sign))
    }
}

#[inline]
fn latin1(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn header_value(value: &str) -> Result<HeaderValue, IdentityProofError> {
    HeaderValue::from_str(value).map_err(|_| {
        IdentityProofError::Canonicalization(format!("Invalid header value: '{}'", value.escape_default()))
    })
}

fn parse_uri(url: &str) -> Result<Uri, IdentityProofError> {
    url.parse::<Uri>()
        .map_err(|e| IdentityProofError::Canonicalization(format!("Invalid request URL '{}': {}", url, e)))
}

#[cfg(test)]
mod tests {
    use {
        crate::{
            AwsCredentials, FixedClock, GetCallerIdentitySigner, IdentityProofError, RequestStyle, StsEndpoints,
        },
        chrono::{DateTime, TimeZone, Utc},
        lazy_static::lazy_static,
        std::{sync::Arc, time::Duration},
    };

    lazy_static! {
        static ref TIMESTAMP: DateTime<Utc> = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        static ref CREDENTIALS: AwsCredentials =
            AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", None).unwrap();
    }

    fn authorization(signed_headers: &str, signature: &str) -> String {
        format!(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/sts/aws4_request, SignedHeaders={}, Signature={}",
            signed_headers, signature
        )
    }

    #[test_log::test]
    fn test_sts_get_vector() {
        let signer = GetCallerIdentitySigner::builder().region("us-east-1").build().unwrap();
        let req = signer.sign_at(&CREDENTIALS, *TIMESTAMP).unwrap();

        assert_eq!(req.uri(), "https://sts.us-east-1.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15");
        assert_eq!(req.headers()["host"], "sts.us-east-1.amazonaws.com");
        assert_eq!(req.headers()["x-amz-date"], "20150830T123600Z");
        assert!(req.body().is_empty());
        assert_eq!(
            req.headers()["authorization"].to_str().unwrap(),
            authorization("host;x-amz-date", "b818e10e31717fbcef99fdc263bf5929590f326b83ce32cd4aa5083c64039076")
        );

        assert_eq!(
            signer.canonical_request_at(&CREDENTIALS, *TIMESTAMP).unwrap(),
            "GET\n/\nAction=GetCallerIdentity&Version=2011-06-15\nhost:sts.us-east-1.amazonaws.com\n\
             x-amz-date:20150830T123600Z\n\nhost;x-amz-date\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test_log::test]
    fn test_deterministic() {
        let signer = GetCallerIdentitySigner::builder().region("us-east-1").build().unwrap();
        let a = signer.sign_at(&CREDENTIALS, *TIMESTAMP).unwrap();
        let b = signer.sign_at(&CREDENTIALS, *TIMESTAMP).unwrap();
        assert_eq!(a.headers(), b.headers());
        assert_eq!(a.uri(), b.uri());
    }

    #[test_log::test]
    fn test_binding_header() {
        let signer = GetCallerIdentitySigner::builder()
            .region("us-east-1")
            .header("X-Vault-AWS-IAM-Server-ID", "vault.example.com")
            .build()
            .unwrap();
        let req = signer.sign_at(&CREDENTIALS, *TIMESTAMP).unwrap();
        assert_eq!(req.headers()["x-vault-aws-iam-server-id"], "vault.example.com");
        assert_eq!(
            req.headers()["authorization"].to_str().unwrap(),
            authorization(
                "host;x-amz-date;x-vault-aws-iam-server-id",
                "717bf787279348af6165d2f802b5b9adfb609fdd0de267e2e77f847b0517f72d"
            )
        );
    }

    #[test_log::test]
    fn test_post_global() {
        let signer = GetCallerIdentitySigner::builder()
            .style(RequestStyle::Post)
            .header("X-Vault-AWS-IAM-Server-ID", "vault.example.com")
            .build()
            .unwrap();
        let req = signer.sign_at(&CREDENTIALS, *TIMESTAMP).unwrap();

        assert_eq!(req.uri(), "https://sts.amazonaws.com/");
        assert_eq!(req.body().as_ref(), b"Action=GetCallerIdentity&Version=2011-06-15");
        assert_eq!(req.headers()["content-type"], "application/x-www-form-urlencoded; charset=utf-8");
        assert_eq!(
            req.headers()["authorization"].to_str().unwrap(),
            authorization(
                "content-type;host;x-amz-date;x-vault-aws-iam-server-id",
                "df234c45af42b105eae29dd0035133e7fadb800a3000a94bf0f44b08c7b38cbe"
            )
        );
    }

    #[test_log::test]
    fn test_session_token() {
        let creds =
            AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", Some("session-token".into()))
                .unwrap();
        let signer = GetCallerIdentitySigner::builder().region("us-east-1").build().unwrap();
        let req = signer.sign_at(&creds, *TIMESTAMP).unwrap();
        assert_eq!(req.headers()["x-amz-security-token"], "session-token");
        assert_eq!(
            req.headers()["authorization"].to_str().unwrap(),
            authorization(
                "host;x-amz-date;x-amz-security-token",
                "dc05a9cd942d22f512f406953d30a36a1400503baa4b13957239eff8fe8341c8"
            )
        );
    }

    #[test_log::test]
    fn test_invalid_extra_headers() {
        let signer = GetCallerIdentitySigner::builder().header("bad header", "value").build().unwrap();
        match signer.sign_at(&CREDENTIALS, *TIMESTAMP) {
            Err(IdentityProofError::Canonicalization(msg)) => assert_eq!(msg, "Invalid header name: 'bad header'"),
            other => panic!("Expected Canonicalization error; got {:?}", other),
        }

        let signer = GetCallerIdentitySigner::builder().header("x-bad", "line\nbreak").build().unwrap();
        assert!(matches!(signer.sign_at(&CREDENTIALS, *TIMESTAMP), Err(IdentityProofError::Canonicalization(_))));

        let signer = GetCallerIdentitySigner::builder().header("x-bad", "caf\u{e9}").build().unwrap();
        assert!(matches!(signer.sign_at(&CREDENTIALS, *TIMESTAMP), Err(IdentityProofError::Canonicalization(_))));

        let signer = GetCallerIdentitySigner::builder().header("Authorization", "x").build().unwrap();
        assert!(matches!(signer.sign_at(&CREDENTIALS, *TIMESTAMP), Err(IdentityProofError::Canonicalization(_))));
    }

    #[test_log::test]
    fn test_reserved_extra_headers() {
        for (name, lower) in [
            ("Host", "host"),
            ("HOST", "host"),
            ("X-Amz-Date", "x-amz-date"),
            ("x-amz-security-token", "x-amz-security-token"),
            ("Authorization", "authorization"),
        ] {
            let signer =
                GetCallerIdentitySigner::builder().region("us-east-1").header(name, "evil.example").build().unwrap();
            let expected = format!("The {} header is set by the signer and cannot be supplied", lower);

            match signer.sign_at(&CREDENTIALS, *TIMESTAMP) {
                Err(IdentityProofError::Canonicalization(msg)) => assert_eq!(msg, expected),
                other => panic!("Expected Canonicalization error for {}; got {:?}", name, other),
            }

            match signer.presign_at(&CREDENTIALS, None, *TIMESTAMP) {
                Err(IdentityProofError::Canonicalization(msg)) => assert_eq!(msg, expected),
                other => panic!("Expected Canonicalization error for {}; got {:?}", name, other),
            }
        }
    }

    #[test_log::test]
    fn test_endpoint_resolution() {
        let signer = GetCallerIdentitySigner::default();
        assert_eq!(signer.endpoint().host(), "sts.amazonaws.com");
        assert_eq!(signer.endpoint().signing_region(), "us-east-1");

        let signer = GetCallerIdentitySigner::builder()
            .region("eu-west-1")
            .endpoint_host("sts-proxy.example.com")
            .build()
            .unwrap();
        assert_eq!(signer.endpoint().host(), "sts-proxy.example.com");
        assert_eq!(signer.endpoint().signing_region(), "eu-west-1");

        let signer = GetCallerIdentitySigner::builder()
            .region("us-east-1")
            .endpoints(Arc::new(StsEndpoints::new("sts.internal", [("us-east-1", "sts.us-east-1.internal")])))
            .build()
            .unwrap();
        assert_eq!(signer.endpoint().host(), "sts.us-east-1.internal");
    }

    #[test_log::test]
    fn test_presign() {
        let signer = GetCallerIdentitySigner::builder()
            .region("us-east-1")
            .header("x-k8s-aws-id", "my-cluster")
            .clock(FixedClock::new(*TIMESTAMP))
            .build()
            .unwrap();
        let url = signer.presign(&CREDENTIALS, None).unwrap();

        assert!(url.starts_with(
            "https://sts.us-east-1.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15\
             &X-Amz-Algorithm=AWS4-HMAC-SHA256\
             &X-Amz-Credential=AKIDEXAMPLE%2F20150830%2Fus-east-1%2Fsts%2Faws4_request\
             &X-Amz-Date=20150830T123600Z&X-Amz-Expires=60&X-Amz-SignedHeaders=host%3Bx-k8s-aws-id&X-Amz-Signature="
        ));

        let url2 = signer.presign_at(&CREDENTIALS, Some(Duration::from_secs(900)), *TIMESTAMP).unwrap();
        assert!(url2.contains("&X-Amz-Expires=900&"));
        assert_ne!(url, url2);
    }

    #[test_log::test(tokio::test)]
    async fn test_sign_with_source() {
        let signer = GetCallerIdentitySigner::builder().clock(FixedClock::new(*TIMESTAMP)).build().unwrap();
        let from_source = signer.sign_with_source(&*CREDENTIALS).await.unwrap();
        let direct = signer.sign_at(&CREDENTIALS, *TIMESTAMP).unwrap();
        assert_eq!(from_source.headers(), direct.headers());
    }
}
