//! The `scratchstack-aws-identity-proof` crate lets a principal holding AWS credentials prove its identity to a
//! third party (a Vault server, a Kubernetes API server, your own service) without handing over those credentials.
//!
//! The prover signs an STS `GetCallerIdentity` request with AWS SigV4 but does not send it. Instead, the signed
//! request is serialized into a payload and given to the verifier. The verifier checks the payload against its own
//! policy, replays the exact request to STS, and trusts whatever identity STS returns. A request that was altered in
//! transit fails STS's signature check.
//!
//! # Workflow
//! On the prover:
//! 1. Build a [`GetCallerIdentitySigner`] and sign a request with [`AwsCredentials`].
//! 2. Convert the [`SignedRequest`] into an [`AwsAuthIamPayload`] and send its JSON or token form to the verifier.
//!
//! On the verifier:
//! 1. Parse the payload with [`AwsAuthIamPayload::from_json`] or [`AwsAuthIamPayload::from_token`].
//! 2. Call [`Verifier::verify_payload`]. The verifier sends the request through any `tower::Service` that speaks
//!    `http::Request<Bytes>`; enable the `reqwest` feature for a ready-made `ReqwestTransport`.
//!
//! ## Example
//! ```rust
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use scratchstack_aws_identity_proof::{
//!     service_for_transport_fn, AwsAuthIamPayload, AwsCredentials, GetCallerIdentitySigner, Verifier,
//!     VerifierConfig,
//! };
//! use tower::BoxError;
//!
//! // A stand-in for STS. A real verifier would use ReqwestTransport.
//! async fn fake_sts(_request: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
//!     Ok(Response::new(Bytes::from_static(
//!         b"<GetCallerIdentityResponse><GetCallerIdentityResult>\
//!           <Arn>arn:aws:iam::123456789012:user/alice</Arn>\
//!           <UserId>AIDAEXAMPLE</UserId>\
//!           <Account>123456789012</Account>\
//!           </GetCallerIdentityResult></GetCallerIdentityResponse>",
//!     )))
//! }
//!
//! # tokio_test::block_on(async {
//! // Prover side.
//! let credentials = AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", None).unwrap();
//! let signer = GetCallerIdentitySigner::builder()
//!     .header("X-Vault-AWS-IAM-Server-ID", "vault.example.com")
//!     .build()
//!     .unwrap();
//! let request = signer.sign(&credentials).unwrap();
//! let token = AwsAuthIamPayload::from_signed_request(&request).unwrap().to_token();
//!
//! // Verifier side.
//! let config = VerifierConfig::builder()
//!     .allowed_host("sts.amazonaws.com")
//!     .required_binding_header("X-Vault-AWS-IAM-Server-ID", "vault.example.com")
//!     .build()
//!     .unwrap();
//! let verifier = Verifier::new(config, service_for_transport_fn(fake_sts));
//! let payload = AwsAuthIamPayload::from_token(&token).unwrap();
//! let identity = verifier.verify_payload(&payload).await.unwrap();
//! assert_eq!(identity.account_id(), "123456789012");
//! assert_eq!(identity.arn(), "arn:aws:iam::123456789012:user/alice");
//! # });
//! ```
#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod canonical;
mod chronoutil;
mod clock;
mod constants;
mod credentials;
mod crypto;
mod endpoints;
mod error;
mod identity;
mod payload;
mod request;
mod signer;
mod signing_key;
mod transport;
mod verifier;

pub use {
    clock::{Clock, FixedClock, SystemClock},
    credentials::{AwsCredentials, AwsCredentialsBuilder, CredentialSource},
    endpoints::{looks_like_sts_host, StsEndpoint, StsEndpoints},
    error::IdentityProofError,
    identity::Identity,
    payload::{decode_kubernetes_token, encode_kubernetes_token, AwsAuthIamPayload},
    request::SignedRequest,
    signer::{GetCallerIdentitySigner, GetCallerIdentitySignerBuilder, RequestStyle},
    signing_key::{CredentialScope, KDateKey, KRegionKey, KSecretKey, KServiceKey, KSigningKey},
    transport::service_for_transport_fn,
    verifier::{Verifier, VerifierConfig, VerifierConfigBuilder},
};

#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
