use {
    crate::{IdentityProofError, KSecretKey},
    async_trait::async_trait,
    derive_builder::Builder,
    std::{
        fmt::{Debug, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

/// AWS credentials used to sign an identity proof.
///
/// The secret access key and session token are never printed by `Debug`. Use [`AwsCredentials::new`] or
/// [`AwsCredentials::builder`] to create one; both reject an empty access key id or secret.
#[derive(Builder, Clone, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct AwsCredentials {
    /// The access key id, e.g. `AKIDEXAMPLE`.
    #[builder(setter(into))]
    access_key_id: String,

    /// The secret access key.
    #[builder(setter(into))]
    secret_access_key: String,

    /// The session token for temporary credentials.
    #[builder(setter(into, strip_option), default)]
    session_token: Option<String>,
}

impl AwsCredentials {
    /// Create a new set of credentials.
    ///
    /// # Errors
    /// Returns [`IdentityProofError::Credential`] if the access key id or secret access key is empty.
    pub fn new<A, S>(
        access_key_id: A,
        secret_access_key: S,
        session_token: Option<String>,
    ) -> Result<Self, IdentityProofError>
    where
        A: Into<String>,
        S: Into<String>,
    {
        let result = Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        };

        check_not_empty(&result.access_key_id, &result.secret_access_key)?;
        Ok(result)
    }

    /// Create a [`AwsCredentialsBuilder`] to construct [`AwsCredentials`].
    #[inline]
    pub fn builder() -> AwsCredentialsBuilder {
        AwsCredentialsBuilder::default()
    }

    /// The access key id.
    #[inline]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The session token, if these are temporary credentials.
    #[inline]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// The `kSecret` signing key derived from the secret access key.
    pub(crate) fn secret_key(&self) -> Result<KSecretKey, IdentityProofError> {
        KSecretKey::from_str(&self.secret_access_key)
    }
}

impl Debug for AwsCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentialsBuilder {
    fn validate(&self) -> Result<(), String> {
        let access_key_id = self.access_key_id.as_deref().unwrap_or_default();
        let secret_access_key = self.secret_access_key.as_deref().unwrap_or_default();
        check_not_empty(access_key_id, secret_access_key).map_err(|e| e.to_string())
    }
}

fn check_not_empty(access_key_id: &str, secret_access_key: &str) -> Result<(), IdentityProofError> {
    if access_key_id.is_empty() {
        return Err(IdentityProofError::Credential("Access key id is empty".to_string()));
    }

    if secret_access_key.is_empty() {
        return Err(IdentityProofError::Credential("Secret access key is empty".to_string()));
    }

    Ok(())
}

/// A source of AWS credentials, such as an instance metadata client or a credential file reader.
///
/// The signer reads credentials exactly once per proof. Acquiring, caching, and refreshing them is
/// the source's business.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Return the credentials to sign with.
    async fn credentials(&self) -> Result<AwsCredentials, IdentityProofError>;
}

#[async_trait]
impl CredentialSource for AwsCredentials {
    async fn credentials(&self) -> Result<AwsCredentials, IdentityProofError> {
        Ok(self.clone())
    }
}
