use {
    crate::{
        constants::*,
        crypto::hmac_sha256,
        IdentityProofError,
    },
    chrono::{DateTime, NaiveDate, Utc},
    std::{
        fmt::{Debug, Display, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

/// A raw AWS secret key (`kSecret`).
#[derive(Clone, PartialEq, Eq)]
pub struct KSecretKey {
    /// The secret key, prefixed with "AWS4".
    prefixed_key: Vec<u8>,
}

/// The `kDate` key: `HMAC_SHA256("AWS4" + KSecretKey, "YYYYMMDD")`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KDateKey {
    /// The raw key.
    key: [u8; SHA256_OUTPUT_LEN],
}

/// The `kRegion` key: an AWS `kDate` key, HMAC-SHA256 hashed with the region.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KRegionKey {
    /// The raw key.
    key: [u8; SHA256_OUTPUT_LEN],
}

/// The `kService` key: an AWS `kRegion` key, HMAC-SHA256 hashed with the service.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KServiceKey {
    /// The raw key.
    key: [u8; SHA256_OUTPUT_LEN],
}

/// The `kSigning` key: an AWS `kService` key, HMAC-SHA256 hashed with the "aws4_request" string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KSigningKey {
    /// The resulting raw signing key.
    key: [u8; SHA256_OUTPUT_LEN],
}

impl AsRef<[u8]> for KSecretKey {
    fn as_ref(&self) -> &[u8] {
        // Remove the "AWS4" prefix.
        &self.prefixed_key[AWS4_KEY_PREFIX.len()..]
    }
}

impl AsRef<[u8; SHA256_OUTPUT_LEN]> for KDateKey {
    fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.key
    }
}

impl AsRef<[u8; SHA256_OUTPUT_LEN]> for KRegionKey {
    fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.key
    }
}

impl AsRef<[u8; SHA256_OUTPUT_LEN]> for KServiceKey {
    fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.key
    }
}

impl AsRef<[u8; SHA256_OUTPUT_LEN]> for KSigningKey {
    fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.key
    }
}

/// Key material never shows up in logs; `Debug` and `Display` print only the key type.
macro_rules! redacted_fmt {
    ($($t:ident),*) => {
        $(
            impl Debug for $t {
                fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                    f.write_str(stringify!($t))
                }
            }

            impl Display for $t {
                fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                    f.write_str(stringify!($t))
                }
            }
        )*
    };
}

redacted_fmt!(KSecretKey, KDateKey, KRegionKey, KServiceKey, KSigningKey);

impl FromStr for KSecretKey {
    type Err = IdentityProofError;

    /// Create a new `KSecretKey` from a raw AWS secret key.
    fn from_str(raw: &str) -> Result<Self, IdentityProofError> {
        if raw.is_empty() {
            return Err(IdentityProofError::Credential("Secret access key is empty".to_string()));
        }

        let mut prefixed_key = Vec::with_capacity(AWS4_KEY_PREFIX.len() + raw.len());
        prefixed_key.extend_from_slice(AWS4_KEY_PREFIX);
        prefixed_key.extend_from_slice(raw.as_bytes());
        Ok(Self {
            prefixed_key,
        })
    }
}

impl KSecretKey {
    /// Create a new `KDateKey` from this `KSecretKey` and a date.
    pub fn to_kdate(&self, date: NaiveDate) -> KDateKey {
        let date = date.format(ISO8601_DATE_FORMAT).to_string();
        KDateKey {
            key: hmac_sha256(self.prefixed_key.as_slice(), date.as_bytes()),
        }
    }

    /// Create a new `KRegionKey` from this `KSecretKey`, a date, and a region.
    pub fn to_kregion(&self, date: NaiveDate, region: &str) -> KRegionKey {
        self.to_kdate(date).to_kregion(region)
    }

    /// Create a new `KServiceKey` from this `KSecretKey`, a date, a region, and a service.
    pub fn to_kservice(&self, date: NaiveDate, region: &str, service: &str) -> KServiceKey {
        self.to_kdate(date).to_kservice(region, service)
    }

    /// Create a new `KSigningKey` from this `KSecretKey`, a date, a region, and a service.
    pub fn to_ksigning(&self, date: NaiveDate, region: &str, service: &str) -> KSigningKey {
        self.to_kdate(date).to_ksigning(region, service)
    }

    /// Create the `KSigningKey` for a [`CredentialScope`].
    pub fn to_ksigning_for_scope(&self, scope: &CredentialScope) -> KSigningKey {
        self.to_ksigning(scope.date(), scope.region(), scope.service())
    }
}

impl KDateKey {
    /// Create a new `KRegionKey` from this `KDateKey` and a region.
    pub fn to_kregion(&self, region: &str) -> KRegionKey {
        KRegionKey {
            key: hmac_sha256(self.key.as_slice(), region.as_bytes()),
        }
    }

    /// Create a new `KServiceKey` from this `KDateKey`, a region, and a service.
    pub fn to_kservice(&self, region: &str, service: &str) -> KServiceKey {
        self.to_kregion(region).to_kservice(service)
    }

    /// Create a new `KSigningKey` from this `KDateKey`, a region, and a service.
    pub fn to_ksigning(&self, region: &str, service: &str) -> KSigningKey {
        self.to_kregion(region).to_ksigning(service)
    }
}

impl KRegionKey {
    /// Create a new `KServiceKey` from this `KRegionKey` and a service.
    pub fn to_kservice(&self, service: &str) -> KServiceKey {
        KServiceKey {
            key: hmac_sha256(self.key.as_slice(), service.as_bytes()),
        }
    }

    /// Create a new `KSigningKey` from this `KRegionKey` and a service.
    pub fn to_ksigning(&self, service: &str) -> KSigningKey {
        self.to_kservice(service).to_ksigning()
    }
}

impl KServiceKey {
    /// Create a new `KSigningKey` from this `KServiceKey`.
    pub fn to_ksigning(&self) -> KSigningKey {
        KSigningKey {
            key: hmac_sha256(self.key.as_slice(), AWS4_REQUEST.as_bytes()),
        }
    }
}

impl KSigningKey {
    /// Sign a string to sign, returning the lower-case hex signature.
    pub fn sign(&self, string_to_sign: &[u8]) -> String {
        hex::encode(hmac_sha256(self.key.as_slice(), string_to_sign))
    }
}

/// The credential scope (`YYYYMMDD/region/service/aws4_request`) that binds a signing key to a
/// date, region, and service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialScope {
    date: NaiveDate,
    region: String,
    service: String,
}

impl CredentialScope {
    /// Create a credential scope for the given date, region, and service.
    pub fn new<R, S>(date: NaiveDate, region: R, service: S) -> Self
    where
        R: Into<String>,
        S: Into<String>,
    {
        Self {
            date,
            region: region.into(),
            service: service.into(),
        }
    }

    /// Create an STS credential scope for the UTC date of `timestamp`.
    pub fn for_sts(timestamp: &DateTime<Utc>, region: &str) -> Self {
        Self::new(timestamp.date_naive(), region, STS_SERVICE)
    }

    /// The date of the scope.
    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The region of the scope.
    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The service of the scope.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Display for CredentialScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}/{}/{}", self.date.format(ISO8601_DATE_FORMAT), self.region, self.service, AWS4_REQUEST)
    }
}

impl FromStr for CredentialScope {
    type Err = IdentityProofError;

    /// Parse a `YYYYMMDD/region/service/aws4_request` scope.
    fn from_str(s: &str) -> Result<Self, IdentityProofError> {
        let parts = s.split('/').collect::<Vec<&str>>();
        if parts.len() != 4 || parts[3] != AWS4_REQUEST {
            return Err(IdentityProofError::MalformedPayload(format!("Invalid credential scope: '{}'", s)));
        }

        let date_str = parts[0];
        if date_str.len() != 8 || !date_str.bytes().all(|c| c.is_ascii_digit()) {
            return Err(IdentityProofError::MalformedPayload(format!("Invalid credential scope date: '{}'", s)));
        }

        let date = NaiveDate::parse_from_str(date_str, ISO8601_DATE_FORMAT)
            .map_err(|_| IdentityProofError::MalformedPayload(format!("Invalid credential scope date: '{}'", s)))?;

        if parts[1].is_empty() || parts[2].is_empty() {
            return Err(IdentityProofError::MalformedPayload(format!("Invalid credential scope: '{}'", s)));
        }

        Ok(Self::new(date, parts[1], parts[2]))
    }
}
