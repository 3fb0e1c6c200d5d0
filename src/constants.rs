//! Common constants used throughout the crate.
//!
//! This was consolidated here so the signer, the payload codec, and the verifier all agree on the
//! exact spelling of header names, query parameters, and protocol strings. If a value is spelled
//! incorrectly, at least it can be fixed in one spot.
//!
//! Tests that are testing the content of an error code or message should not use these constants;
//! they should use hard-coded strings so the tests are also testing for misspellings.
//!
//! Please keep this file organized alphabetically. (This can be a bit hard with comments, etc.)

/// The STS action used as an identity oracle.
pub(crate) const ACTION_GET_CALLER_IDENTITY: &str = "GetCallerIdentity";

/// Content-Type sent with form-encoded `GetCallerIdentity` bodies.
pub(crate) const APPLICATION_X_WWW_FORM_URLENCODED_UTF8: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Algorithm for AWS SigV4
pub(crate) const AWS4_HMAC_SHA256: &str = "AWS4-HMAC-SHA256";

/// Algorithm for AWS SigV4 (bytes)
pub(crate) const AWS4_HMAC_SHA256_BYTES: &[u8] = b"AWS4-HMAC-SHA256";

/// Prefix prepended to the secret access key to form `kSecret`.
pub(crate) const AWS4_KEY_PREFIX: &[u8] = b"AWS4";

/// String included at the end of the AWS SigV4 credential scope
pub(crate) const AWS4_REQUEST: &str = "aws4_request";

/// Signature field for the access key
pub(crate) const CREDENTIAL: &[u8] = b"Credential";

/// Default allowed clock skew (request timestamp ahead of the verifier) in minutes.
pub(crate) const DEFAULT_CLOCK_SKEW_MINUTES: i64 = 5;

/// Default lifetime of a pre-signed URL in seconds.
pub(crate) const DEFAULT_PRESIGN_EXPIRES_SECS: u64 = 60;

/// Default region used for signing when none is specified.
pub(crate) const DEFAULT_REGION: &str = "us-east-1";

/// Default maximum age of a proof in minutes.
pub(crate) const DEFAULT_MAX_AGE_MINUTES: i64 = 15;

/// Default timeout for replaying a proof against STS, in seconds.
pub(crate) const DEFAULT_REPLAY_TIMEOUT_SECS: u64 = 10;

/// Error code: CanonicalizationError
pub(crate) const ERR_CODE_CANONICALIZATION: &str = "CanonicalizationError";

/// Error code: CredentialError
pub(crate) const ERR_CODE_CREDENTIAL: &str = "CredentialError";

/// Error code: IdentityRejected
pub(crate) const ERR_CODE_IDENTITY_REJECTED: &str = "IdentityRejected";

/// Error code: InternalFailure
pub(crate) const ERR_CODE_INTERNAL_FAILURE: &str = "InternalFailure";

/// Error code: MalformedPayload
pub(crate) const ERR_CODE_MALFORMED_PAYLOAD: &str = "MalformedPayload";

/// Error code: PolicyRejected
pub(crate) const ERR_CODE_POLICY_REJECTED: &str = "PolicyRejected";

/// Error code: VerificationCancelled
pub(crate) const ERR_CODE_VERIFICATION_CANCELLED: &str = "VerificationCancelled";

/// Error code: VerificationTimeout
pub(crate) const ERR_CODE_VERIFICATION_TIMEOUT: &str = "VerificationTimeout";

/// The form-encoded body of a `POST` `GetCallerIdentity` request.
pub(crate) const GET_CALLER_IDENTITY_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";

/// Header for `authorization`
pub(crate) const HDR_AUTHORIZATION: &str = "authorization";

/// Header for `content-type`
pub(crate) const HDR_CONTENT_TYPE: &str = "content-type";

/// Header for `host`
pub(crate) const HDR_HOST: &str = "host";

/// Header for delivering the request timestamp
pub(crate) const HDR_X_AMZ_DATE: &str = "x-amz-date";

/// Header for delivering the session token
pub(crate) const HDR_X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

/// Uppercase hex digits.
pub(crate) const HEX_DIGITS_UPPER: [u8; 16] =
    [b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'A', b'B', b'C', b'D', b'E', b'F'];

/// Compact ISO8601 format used for the string to sign.
pub(crate) const ISO8601_COMPACT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Short date format
pub(crate) const ISO8601_DATE_FORMAT: &str = "%Y%m%d";

/// Length of an ISO8601 date string in the UTC time zone.
pub(crate) const ISO8601_UTC_LENGTH: usize = 16;

/// Prefix of an `aws-iam-authenticator` style Kubernetes bearer token.
pub(crate) const KUBERNETES_TOKEN_PREFIX: &str = "k8s-aws-v1.";

/// Error message: `"Authorization header requires 'Credential' parameter."`
pub(crate) const MSG_AUTH_HEADER_REQ_CREDENTIAL: &str = "Authorization header requires 'Credential' parameter.";

/// Error message: `"Authorization header requires 'Signature' parameter."`
pub(crate) const MSG_AUTH_HEADER_REQ_SIGNATURE: &str = "Authorization header requires 'Signature' parameter.";

/// Error message: `"Authorization header requires 'SignedHeaders' parameter."`
pub(crate) const MSG_AUTH_HEADER_REQ_SIGNED_HEADERS: &str = "Authorization header requires 'SignedHeaders' parameter.";

/// Error message: `"Credential must have exactly 5 slash-delimited elements, e.g. keyid/date/region/service/term,"`
pub(crate) const MSG_CREDENTIAL_MUST_HAVE_FIVE_PARTS: &str =
    "Credential must have exactly 5 slash-delimited elements, e.g. keyid/date/region/service/term,";

/// Error message: `"Illegal hex character in escape % pattern: %"`
pub(crate) const MSG_ILLEGAL_HEX_CHAR: &str = "Illegal hex character in escape % pattern: %";

/// Error message: `"Incomplete trailing escape % sequence"`
pub(crate) const MSG_INCOMPLETE_TRAILING_ESCAPE: &str = "Incomplete trailing escape % sequence";

/// Error message: `"The request signature we calculated does not match the signature you provided. Check your AWS Secret Access Key and signing method. Consult the service documentation for details."`
pub(crate) const MSG_REQUEST_SIGNATURE_MISMATCH: &str = "The request signature we calculated does not match the signature you provided. Check your AWS Secret Access Key and signing method. Consult the service documentation for details.";

/// Error message: `"Request is missing Authentication Token"`
pub(crate) const MSG_REQUEST_MISSING_AUTH_TOKEN: &str = "Request is missing Authentication Token";

/// Error message: `"Unsupported AWS 'algorithm': "`
pub(crate) const MSG_UNSUPPORTED_ALGORITHM: &str = "Unsupported AWS 'algorithm': ";

/// Query parameter for the STS action
pub(crate) const QP_ACTION: &str = "Action";

/// Query parameter for the STS API version
pub(crate) const QP_VERSION: &str = "Version";

/// Query parameter for the signature algorithm
pub(crate) const QP_X_AMZ_ALGORITHM: &str = "X-Amz-Algorithm";

/// Query parameter for delivering the access key
pub(crate) const QP_X_AMZ_CREDENTIAL: &str = "X-Amz-Credential";

/// Query parameter for delivering the date
pub(crate) const QP_X_AMZ_DATE: &str = "X-Amz-Date";

/// Query parameter for delivering the expiration time of a presigned URL
pub(crate) const QP_X_AMZ_EXPIRES: &str = "X-Amz-Expires";

/// Query parameter for delivering the session token
pub(crate) const QP_X_AMZ_SECURITY_TOKEN: &str = "X-Amz-Security-Token";

/// Query parameter for delivering the signature
pub(crate) const QP_X_AMZ_SIGNATURE: &str = "X-Amz-Signature";

/// Query parameter specifying the signed headers
pub(crate) const QP_X_AMZ_SIGNED_HEADERS: &str = "X-Amz-SignedHeaders";

/// SHA-256 of an empty string.
pub(crate) const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Length of a SHA-256 hex string.
pub(crate) const SHA256_HEX_LENGTH: usize = SHA256_EMPTY.len();

/// The length of a SHA-256 digest in bytes.
pub(crate) const SHA256_OUTPUT_LEN: usize = 32;

/// Signature field for the signature itself
pub(crate) const SIGNATURE: &[u8] = b"Signature";

/// Authorization header parameter specifying the signed headers
pub(crate) const SIGNED_HEADERS: &[u8] = b"SignedHeaders";

/// The SigV4 service name for STS.
pub(crate) const STS_SERVICE: &str = "sts";

/// The STS API version.
pub(crate) const STS_VERSION: &str = "2011-06-15";

