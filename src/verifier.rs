use {
    crate::{
        auth::{AuthenticationLocation, SigV4Authenticator},
        canonical::query_string_to_normalized_map,
        chronoutil::format_amz_date,
        constants::*,
        identity::sts_error_message,
        AwsAuthIamPayload, Clock, Identity, IdentityProofError, SignedRequest, StsEndpoints, SystemClock,
    },
    bytes::Bytes,
    chrono::{DateTime, Duration, Utc},
    derive_builder::Builder,
    http::{
        header::CONTENT_TYPE,
        method::Method,
        request::Request,
        response::Response,
        status::StatusCode,
    },
    log::{debug, info, trace},
    std::{collections::HashSet, future::Future, sync::Arc, time::Duration as StdDuration},
    subtle::ConstantTimeEq,
    tower::{BoxError, Service, ServiceExt},
};

/// Verifier policy.
///
/// ```
/// # use scratchstack_aws_identity_proof::VerifierConfig;
/// let config = VerifierConfig::builder()
///     .allowed_host("sts.amazonaws.com")
///     .required_binding_header("X-Vault-AWS-IAM-Server-ID", "vault.example.com")
///     .build()
///     .unwrap();
/// assert!(config.allowed_hosts().contains("sts.amazonaws.com"));
/// ```
#[derive(Builder, Clone, Debug)]
#[builder(derive(Debug))]
pub struct VerifierConfig {
    /// Hosts a proof may address. When empty, any host shaped like an STS endpoint in the verifier's endpoint table is
    /// accepted.
    #[builder(setter(custom), default)]
    allowed_hosts: HashSet<String>,

    /// How old a proof may be.
    #[builder(default = "Duration::minutes(DEFAULT_MAX_AGE_MINUTES)")]
    max_age: Duration,

    /// How far in the future a proof's timestamp may be.
    #[builder(default = "Duration::minutes(DEFAULT_CLOCK_SKEW_MINUTES)")]
    clock_skew_tolerance: Duration,

    /// A header the proof must sign with exactly this value, stored as a lower-case name and value.
    #[builder(setter(custom), default)]
    required_binding_header: Option<(String, String)>,

    /// How long to wait for STS.
    #[builder(default = "StdDuration::from_secs(DEFAULT_REPLAY_TIMEOUT_SECS)")]
    replay_timeout: StdDuration,
}

impl VerifierConfigBuilder {
    /// Allow proofs addressed to `host`.
    pub fn allowed_host<H: Into<String>>(&mut self, host: H) -> &mut Self {
        self.allowed_hosts.get_or_insert_with(HashSet::new).insert(host.into().to_ascii_lowercase());
        self
    }

    /// Allow proofs addressed to any of `hosts`.
    pub fn allowed_hosts<I, H>(&mut self, hosts: I) -> &mut Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        let allowed = self.allowed_hosts.get_or_insert_with(HashSet::new);
        allowed.extend(hosts.into_iter().map(|h| h.into().to_ascii_lowercase()));
        self
    }

    /// Require proofs to sign the header `name` with `value`, e.g. `X-Vault-AWS-IAM-Server-ID`.
    pub fn required_binding_header<N, V>(&mut self, name: N, value: V) -> &mut Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.required_binding_header = Some(Some((name.into().to_ascii_lowercase(), value.into())));
        self
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: HashSet::new(),
            max_age: Duration::minutes(DEFAULT_MAX_AGE_MINUTES),
            clock_skew_tolerance: Duration::minutes(DEFAULT_CLOCK_SKEW_MINUTES),
            required_binding_header: None,
            replay_timeout: StdDuration::from_secs(DEFAULT_REPLAY_TIMEOUT_SECS),
        }
    }
}

impl VerifierConfig {
    /// Create a [`VerifierConfigBuilder`].
    #[inline]
    pub fn builder() -> VerifierConfigBuilder {
        VerifierConfigBuilder::default()
    }

    /// The lower-case hosts a proof may address.
    #[inline]
    pub fn allowed_hosts(&self) -> &HashSet<String> {
        &self.allowed_hosts
    }

    /// The maximum age of a proof.
    #[inline]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// How far ahead of the verifier's clock a proof may be.
    #[inline]
    pub fn clock_skew_tolerance(&self) -> Duration {
        self.clock_skew_tolerance
    }

    /// The lower-case binding header name and its required value.
    #[inline]
    pub fn required_binding_header(&self) -> Option<(&str, &str)> {
        self.required_binding_header.as_ref().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The time allowed for STS to answer.
    #[inline]
    pub fn replay_timeout(&self) -> StdDuration {
        self.replay_timeout
    }
}

/// Verifies identity proofs by replaying them to STS through `T`.
///
/// `T` is any [`tower::Service`] that sends an HTTP request, such as
/// [`service_for_transport_fn`][crate::service_for_transport_fn] or `ReqwestTransport`. A verifier holds no mutable
/// state; clone it to verify proofs concurrently.
#[derive(Clone, Debug)]
pub struct Verifier<T> {
    config: VerifierConfig,
    transport: T,
    clock: Arc<dyn Clock>,
    endpoints: Arc<StsEndpoints>,
}

impl<T> Verifier<T>
where
    T: Service<Request<Bytes>, Response = Response<Bytes>, Error = BoxError> + Clone + Send + Sync,
    T::Future: Send,
{
    /// Create a verifier using the system clock and the AWS endpoint table.
    pub fn new(config: VerifierConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            clock: Arc::new(SystemClock),
            endpoints: StsEndpoints::aws_default(),
        }
    }

    /// Use `clock` instead of the system clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Use `endpoints` to recognize STS hosts when no allow-list is configured.
    pub fn with_endpoints(mut self, endpoints: Arc<StsEndpoints>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The verifier policy.
    #[inline]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify a signed request and return the identity STS reports for it.
    ///
    /// # Errors
    /// * [`IdentityProofError::MalformedPayload`] or [`IdentityProofError::Canonicalization`] if the request is not a
    ///   well-formed, signed `GetCallerIdentity` call.
    /// * [`IdentityProofError::PolicyRejected`] if the host, timestamp, or binding header fails policy. STS is not
    ///   contacted.
    /// * [`IdentityProofError::VerificationTimeout`] if STS does not answer within the replay timeout.
    /// * [`IdentityProofError::IdentityRejected`] if STS rejects the request or its answer has no identity.
    /// * [`IdentityProofError::Transport`] for other transport failures.
    pub async fn verify(&self, request: SignedRequest) -> Result<Identity, IdentityProofError> {
        let now = self.clock.now();
        let result = async {
            Received::new(request)
                .validate_structure()?
                .check_policy(&self.config, &self.endpoints, now)?
                .replay(self.transport.clone(), self.config.replay_timeout)
                .await?
                .into_identity()
        }
        .await;

        if let Err(ref e) = result {
            debug!("Identity proof rejected: {}", e);
        }

        result
    }

    /// Deserialize `payload` and verify it.
    pub async fn verify_payload(&self, payload: &AwsAuthIamPayload) -> Result<Identity, IdentityProofError> {
        let request = payload.into_signed_request()?;
        self.verify(request).await
    }

    /// Verify a signed request, giving up with [`IdentityProofError::VerificationCancelled`] as soon as `cancel`
    /// completes. An in-flight STS call is dropped.
    pub async fn verify_with_cancellation<C>(
        &self,
        request: SignedRequest,
        cancel: C,
    ) -> Result<Identity, IdentityProofError>
    where
        C: Future<Output = ()> + Send,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!("Identity proof verification cancelled");
                Err(IdentityProofError::VerificationCancelled)
            }
            result = self.verify(request) => result,
        }
    }
}

/// A verification attempt that has not been examined.
struct Received {
    request: SignedRequest,
}

/// A well-formed, signed `GetCallerIdentity` request.
struct StructurallyValidated {
    request: SignedRequest,
    auth: SigV4Authenticator,
}

/// A request that satisfies verifier policy and may be sent to STS.
struct PolicyChecked {
    request: SignedRequest,
}

/// The STS answer to a replayed request.
struct Replayed {
    status: StatusCode,
    content_type: Option<String>,
    body: Bytes,
}

impl Received {
    fn new(request: SignedRequest) -> Self {
        Self {
            request,
        }
    }

    fn validate_structure(self) -> Result<StructurallyValidated, IdentityProofError> {
        let request = self.request;

        if *request.method() != Method::GET && *request.method() != Method::POST {
            return Err(IdentityProofError::MalformedPayload(format!(
                "Unsupported request method: '{}'",
                request.method()
            )));
        }

        let uri = request.uri();
        if uri.scheme_str() != Some("https") {
            return Err(IdentityProofError::MalformedPayload(format!("Request URL is not an https URL: {}", uri)));
        }

        let authority = match uri.authority() {
            Some(authority) => authority.as_str(),
            None => return Err(IdentityProofError::MalformedPayload(format!("Request URL is not absolute: {}", uri))),
        };

        let mut hosts = request.headers().get_all(HDR_HOST).iter();
        match (hosts.next(), hosts.next()) {
            (None, _) => {
                return Err(IdentityProofError::MalformedPayload(format!("Missing required header: {}", HDR_HOST)))
            }
            (Some(_), Some(_)) => {
                return Err(IdentityProofError::MalformedPayload("Request has multiple Host headers".to_string()))
            }
            (Some(host), None) => {
                if !host.as_bytes().eq_ignore_ascii_case(authority.as_bytes()) {
                    return Err(IdentityProofError::MalformedPayload(format!(
                        "Host header '{}' does not match the request URL authority '{}'",
                        String::from_utf8_lossy(host.as_bytes()),
                        authority
                    )));
                }
            }
        }

        let auth = SigV4Authenticator::from_signed_request(&request)?;
        trace!("validate_structure: {:?}", auth);

        if auth.credential_scope().service() != STS_SERVICE {
            return Err(IdentityProofError::MalformedPayload(format!(
                "Credential should be scoped to service '{}', not '{}'",
                STS_SERVICE,
                auth.credential_scope().service()
            )));
        }

        let action = request_action(&request)?;
        if action.as_deref() != Some(ACTION_GET_CALLER_IDENTITY) {
            return Err(IdentityProofError::MalformedPayload(format!(
                "Request action must be '{}', not '{}'",
                ACTION_GET_CALLER_IDENTITY,
                action.unwrap_or_default()
            )));
        }

        Ok(StructurallyValidated {
            request,
            auth,
        })
    }
}

/// Find the single `Action` parameter in the query string or, for a form-encoded `POST`, the body.
fn request_action(request: &SignedRequest) -> Result<Option<String>, IdentityProofError> {
    let mut actions = Vec::new();

    if let Some(query) = request.uri().query() {
        let parameters = query_string_to_normalized_map(query)?;
        if let Some(values) = parameters.get(QP_ACTION) {
            actions.extend(values.iter().cloned());
        }
    }

    if *request.method() == Method::POST && !request.body().is_empty() {
        let body = std::str::from_utf8(request.body())
            .map_err(|_| IdentityProofError::MalformedPayload("Request body is not valid UTF-8".to_string()))?;
        let parameters = query_string_to_normalized_map(body)?;
        if let Some(values) = parameters.get(QP_ACTION) {
            actions.extend(values.iter().cloned());
        }
    }

    match actions.len() {
        0 => Ok(None),
        1 => Ok(actions.pop()),
        _ => Err(IdentityProofError::MalformedPayload("Request specifies more than one Action".to_string())),
    }
}

impl StructurallyValidated {
    fn check_policy(
        self,
        config: &VerifierConfig,
        endpoints: &StsEndpoints,
        now: DateTime<Utc>,
    ) -> Result<PolicyChecked, IdentityProofError> {
        let Self {
            request,
            auth,
        } = self;

        // validate_structure guarantees an authority.
        let authority = request.uri().authority().map(|a| a.as_str().to_ascii_lowercase()).unwrap_or_default();
        let host_allowed = if config.allowed_hosts.is_empty() {
            endpoints.is_sts_host(&authority)
        } else {
            config.allowed_hosts.contains(&authority)
        };

        if !host_allowed {
            return Err(IdentityProofError::PolicyRejected(format!("Host is not allowed: {}", authority)));
        }

        let req_ts = auth.request_timestamp();
        let oldest = now.checked_sub_signed(config.max_age).unwrap_or(now);
        let newest = now.checked_add_signed(config.clock_skew_tolerance).unwrap_or(now);

        if req_ts < oldest {
            return Err(IdentityProofError::PolicyRejected(format!(
                "Request timestamp {} is earlier than {} ({} - {} min.)",
                format_amz_date(&req_ts),
                format_amz_date(&oldest),
                format_amz_date(&now),
                config.max_age.num_minutes()
            )));
        }

        if req_ts > newest {
            return Err(IdentityProofError::PolicyRejected(format!(
                "Request timestamp {} is later than {} ({} + {} min.)",
                format_amz_date(&req_ts),
                format_amz_date(&newest),
                format_amz_date(&now),
                config.clock_skew_tolerance.num_minutes()
            )));
        }

        if auth.location() == AuthenticationLocation::QueryString {
            if let Some(expires) = auth.expires() {
                let expires_at = req_ts.checked_add_signed(expires).unwrap_or(req_ts);
                if expires_at < now {
                    return Err(IdentityProofError::PolicyRejected(format!(
                        "Pre-signed URL expired at {}",
                        format_amz_date(&expires_at)
                    )));
                }
            }
        }

        if let Some((name, expected)) = config.required_binding_header() {
            check_binding_header(&request, &auth, name, expected)?;
        }

        Ok(PolicyChecked {
            request,
        })
    }
}

fn check_binding_header(
    request: &SignedRequest,
    auth: &SigV4Authenticator,
    name: &str,
    expected: &str,
) -> Result<(), IdentityProofError> {
    let mut values = request.headers().get_all(name).iter();
    let value = match (values.next(), values.next()) {
        (None, _) => return Err(IdentityProofError::PolicyRejected(format!("Missing binding header: {}", name))),
        (Some(_), Some(_)) => {
            return Err(IdentityProofError::PolicyRejected(format!("Binding header {} has multiple values", name)))
        }
        (Some(value), None) => value,
    };

    if !auth.signed_headers().iter().any(|h| h == name) {
        return Err(IdentityProofError::PolicyRejected(format!("Binding header {} is not signed", name)));
    }

    let is_equal: bool = value.as_bytes().ct_eq(expected.as_bytes()).into();
    if !is_equal {
        return Err(IdentityProofError::PolicyRejected(format!("Binding header {} does not match", name)));
    }

    Ok(())
}

impl PolicyChecked {
    async fn replay<T>(self, transport: T, timeout: StdDuration) -> Result<Replayed, IdentityProofError>
    where
        T: Service<Request<Bytes>, Response = Response<Bytes>, Error = BoxError>,
    {
        let request: Request<Bytes> = self.request.into();
        trace!("Replaying {} {} to STS", request.method(), request.uri());

        let response = match tokio::time::timeout(timeout, transport.oneshot(request)).await {
            Err(_) => {
                return Err(IdentityProofError::VerificationTimeout(format!(
                    "STS did not respond within {} ms",
                    timeout.as_millis()
                )))
            }
            Ok(result) => result.map_err(IdentityProofError::from)?,
        };

        let (parts, body) = response.into_parts();
        let content_type = parts.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(|v| v.to_string());

        Ok(Replayed {
            status: parts.status,
            content_type,
            body,
        })
    }
}

impl Replayed {
    fn into_identity(self) -> Result<Identity, IdentityProofError> {
        if !self.status.is_success() {
            return Err(IdentityProofError::IdentityRejected {
                status: self.status,
                message: sts_error_message(self.content_type.as_deref(), &self.body),
            });
        }

        let identity = Identity::from_sts_response(self.status, self.content_type.as_deref(), self.body)?;
        info!("Identity proof accepted: account={} arn={}", identity.account_id(), identity.arn());
        Ok(identity)
    }
}
