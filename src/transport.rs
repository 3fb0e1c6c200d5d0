use {
    bytes::Bytes,
    http::{request::Request, response::Response},
    std::future::Future,
    tower::{service_fn, util::ServiceFn, BoxError},
};

#[cfg(feature = "reqwest")]
use {
    crate::IdentityProofError,
    std::{
        pin::Pin,
        task::{Context, Poll},
    },
    tower::Service,
};

// A trait alias that describes the HTTP transport the verifier replays requests through. Any
// `tower::Service<Request<Bytes>, Response = Response<Bytes>, Error = BoxError>` works.
//
// This requires the trait_alias feature to be stabilized and is commented out until then.
// https://github.com/rust-lang/rust/issues/41517
//
// pub trait Transport = Service<Request<Bytes>, Response = Response<Bytes>, Error = BoxError> + Clone + Send + Sync;

/// Create a Service that wraps a function that can send an HTTP request. Useful for test doubles.
pub fn service_for_transport_fn<F, Fut>(f: F) -> ServiceFn<F>
where
    F: FnMut(Request<Bytes>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Response<Bytes>, BoxError>> + Send + 'static,
{
    service_fn(f)
}

/// A transport backed by a [`reqwest::Client`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestTransport {
    /// Wrap an existing client.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
        }
    }

    /// Create a transport that only speaks `https` and never follows redirects.
    pub fn https_only() -> Result<Self, IdentityProofError> {
        let client = reqwest::Client::builder()
            .https_only(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IdentityProofError::Transport(Box::new(e)))?;
        Ok(Self::new(client))
    }
}

#[cfg(feature = "reqwest")]
impl Service<Request<Bytes>> for ReqwestTransport {
    type Response = Response<Bytes>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Bytes>, BoxError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let client = self.client.clone();

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let response =
                client.request(parts.method, parts.uri.to_string()).headers(parts.headers).body(body).send().await?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            let mut result = Response::new(body);
            *result.status_mut() = status;
            *result.headers_mut() = headers;
            Ok(result)
        })
    }
}
