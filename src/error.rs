use {
    crate::constants::*,
    http::status::StatusCode,
    scratchstack_errors::ServiceError,
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    },
    tower::BoxError,
};

/// Error returned when producing or verifying an AWS identity proof fails.
///
/// Every rejection path has its own variant so the calling application can audit precisely why a
/// proof failed. Only [`VerificationTimeout`][Self::VerificationTimeout] is worth retrying.
#[derive(Debug)]
#[non_exhaustive]
pub enum IdentityProofError {
    /// Credential material is missing or invalid (e.g. an empty access key or secret key).
    Credential(/* message */ String),

    /// The request could not be canonicalized: the URI path is not absolute or escapes the root,
    /// a percent-escape is malformed, or a header/query value contains characters outside the
    /// allowed set.
    Canonicalization(/* message */ String),

    /// The payload could not be parsed, is missing a required field (`Authorization`,
    /// `X-Amz-Date`, `Host`), or does not target an STS endpoint.
    MalformedPayload(/* message */ String),

    /// The payload was well-formed but failed verifier policy: the host is not allow-listed, the
    /// timestamp is outside the freshness window, or the binding header is absent or mismatched.
    PolicyRejected(/* message */ String),

    /// The STS replay did not complete within the configured timeout.
    VerificationTimeout(/* message */ String),

    /// The caller cancelled the verification before the STS replay completed.
    VerificationCancelled,

    /// STS answered the replay with a non-success status, or the answer did not contain an
    /// identity. This is how an invalid signature or invalid credentials surface.
    IdentityRejected {
        /// The HTTP status returned by STS.
        status: StatusCode,

        /// A description of the rejection, including the STS error code when one was returned.
        message: String,
    },

    /// The transport failed for a reason other than a timeout (DNS failure, connection reset,
    /// ...).
    Transport(BoxError),
}

impl IdentityProofError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Credential(_) => ERR_CODE_CREDENTIAL,
            Self::Canonicalization(_) => ERR_CODE_CANONICALIZATION,
            Self::MalformedPayload(_) => ERR_CODE_MALFORMED_PAYLOAD,
            Self::PolicyRejected(_) => ERR_CODE_POLICY_REJECTED,
            Self::VerificationTimeout(_) => ERR_CODE_VERIFICATION_TIMEOUT,
            Self::VerificationCancelled => ERR_CODE_VERIFICATION_CANCELLED,
            Self::IdentityRejected {
                ..
            } => ERR_CODE_IDENTITY_REJECTED,
            Self::Transport(_) => ERR_CODE_INTERNAL_FAILURE,
        }
    }

    fn http_status(&self) -> StatusCode {
        match self {
            Self::Credential(_) | Self::Canonicalization(_) | Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::PolicyRejected(_)
            | Self::IdentityRejected {
                ..
            } => StatusCode::FORBIDDEN,
            Self::VerificationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // nginx's "client closed request"; there is no standard code for this.
            Self::VerificationCancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Indicates whether retrying the same operation could succeed.
    ///
    /// Only timeouts are retryable; policy and identity rejections never change on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VerificationTimeout(_))
    }
}

impl ServiceError for IdentityProofError {
    fn error_code(&self) -> &'static str {
        IdentityProofError::error_code(self)
    }

    fn http_status(&self) -> StatusCode {
        IdentityProofError::http_status(self)
    }
}

impl Display for IdentityProofError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Credential(msg) => f.write_str(msg),
            Self::Canonicalization(msg) => f.write_str(msg),
            Self::MalformedPayload(msg) => f.write_str(msg),
            Self::PolicyRejected(msg) => f.write_str(msg),
            Self::VerificationTimeout(msg) => f.write_str(msg),
            Self::VerificationCancelled => f.write_str("Verification was cancelled"),
            Self::IdentityRejected {
                status,
                message,
            } => write!(f, "STS rejected the identity proof ({}): {}", status.as_u16(), message),
            Self::Transport(ref e) => Display::fmt(e, f),
        }
    }
}

impl Error for IdentityProofError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<BoxError> for IdentityProofError {
    fn from(e: BoxError) -> IdentityProofError {
        match e.downcast::<IdentityProofError>() {
            Ok(proof_err) => *proof_err,
            Err(e) => IdentityProofError::Transport(e),
        }
    }
}
