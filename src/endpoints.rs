use {
    crate::constants::DEFAULT_REGION,
    lazy_static::lazy_static,
    regex::Regex,
    std::{collections::HashMap, sync::Arc},
};

lazy_static! {
    /// Host names that look like an AWS STS endpoint: the global endpoint, regional endpoints (including the China
    /// partition), and FIPS endpoints.
    static ref STS_HOST_REGEX: Regex =
        Regex::new(r"^sts(-fips)?(\.[a-z]{2}(-gov)?-[a-z]+-[0-9])?\.amazonaws\.com(\.cn)?$").unwrap();

    static ref AWS_DEFAULT_ENDPOINTS: Arc<StsEndpoints> = Arc::new(StsEndpoints::new(
        "sts.amazonaws.com",
        [
            ("cn-north-1", "sts.cn-north-1.amazonaws.com.cn"),
            ("cn-northwest-1", "sts.cn-northwest-1.amazonaws.com.cn"),
            ("us-gov-east-1", "sts.us-gov-east-1.amazonaws.com"),
            ("us-gov-west-1", "sts.us-gov-west-1.amazonaws.com"),
        ],
    ));
}

/// A resolved STS endpoint: where to send the request and which region to sign it for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StsEndpoint {
    host: String,
    signing_region: String,
}

impl StsEndpoint {
    /// Create an endpoint for `host`, signed for `signing_region`.
    pub fn new<H: Into<String>, R: Into<String>>(host: H, signing_region: R) -> Self {
        Self {
            host: host.into(),
            signing_region: signing_region.into(),
        }
    }

    /// The host name, e.g. `sts.us-west-2.amazonaws.com`.
    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The region used in the credential scope.
    #[inline]
    pub fn signing_region(&self) -> &str {
        &self.signing_region
    }
}

/// An immutable mapping from AWS region to STS endpoint host.
///
/// Regions without an explicit entry resolve to `sts.<region>.amazonaws.com` (or `.amazonaws.com.cn` for `cn-`
/// regions). No region at all resolves to the global endpoint, signed for `us-east-1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StsEndpoints {
    global_host: String,
    regional_hosts: HashMap<String, String>,
}

impl StsEndpoints {
    /// Create an endpoint table from the global host and a set of `(region, host)` overrides.
    pub fn new<G, I, R, H>(global_host: G, regional_hosts: I) -> Self
    where
        G: Into<String>,
        I: IntoIterator<Item = (R, H)>,
        R: Into<String>,
        H: Into<String>,
    {
        Self {
            global_host: global_host.into(),
            regional_hosts: regional_hosts.into_iter().map(|(r, h)| (r.into(), h.into())).collect(),
        }
    }

    /// The shared endpoint table for the public AWS partitions.
    pub fn aws_default() -> Arc<StsEndpoints> {
        AWS_DEFAULT_ENDPOINTS.clone()
    }

    /// Resolve the endpoint for `region`. `None` selects the global endpoint.
    pub fn resolve(&self, region: Option<&str>) -> StsEndpoint {
        match region {
            None => StsEndpoint::new(self.global_host.clone(), DEFAULT_REGION),
            Some(region) => {
                let host = match self.regional_hosts.get(region) {
                    Some(host) => host.clone(),
                    None if region.starts_with("cn-") => format!("sts.{}.amazonaws.com.cn", region),
                    None => format!("sts.{}.amazonaws.com", region),
                };

                StsEndpoint::new(host, region)
            }
        }
    }

    /// Indicates whether `host` is in this table or has the shape of an AWS STS endpoint.
    pub fn is_sts_host(&self, host: &str) -> bool {
        host == self.global_host || self.regional_hosts.values().any(|h| h == host) || looks_like_sts_host(host)
    }
}

/// Indicates whether `host` has the shape of an AWS STS endpoint (`sts.amazonaws.com`, `sts.<region>.amazonaws.com`,
/// `sts.<region>.amazonaws.com.cn`, or a `sts-fips` variant). Ports are not accepted.
pub fn looks_like_sts_host(host: &str) -> bool {
    STS_HOST_REGEX.is_match(host)
}

#[cfg(test)]
mod tests {
    use crate::{looks_like_sts_host, StsEndpoints};

    #[test_log::test]
    fn test_resolve() {
        let endpoints = StsEndpoints::aws_default();

        let global = endpoints.resolve(None);
        assert_eq!(global.host(), "sts.amazonaws.com");
        assert_eq!(global.signing_region(), "us-east-1");

        let regional = endpoints.resolve(Some("eu-west-1"));
        assert_eq!(regional.host(), "sts.eu-west-1.amazonaws.com");
        assert_eq!(regional.signing_region(), "eu-west-1");

        let china = endpoints.resolve(Some("cn-north-1"));
        assert_eq!(china.host(), "sts.cn-north-1.amazonaws.com.cn");

        let china = endpoints.resolve(Some("cn-south-9"));
        assert_eq!(china.host(), "sts.cn-south-9.amazonaws.com.cn");
    }

    #[test_log::test]
    fn test_custom_table() {
        let endpoints = StsEndpoints::new("sts.internal.example", [("us-east-1", "sts-proxy.internal.example")]);
        assert_eq!(endpoints.resolve(Some("us-east-1")).host(), "sts-proxy.internal.example");
        assert_eq!(endpoints.resolve(None).host(), "sts.internal.example");
        assert!(endpoints.is_sts_host("sts-proxy.internal.example"));
        assert!(endpoints.is_sts_host("sts.internal.example"));
        assert!(!endpoints.is_sts_host("evil.example"));
    }

    #[test_log::test]
    fn test_sts_host_shapes() {
        for host in [
            "sts.amazonaws.com",
            "sts.us-east-1.amazonaws.com",
            "sts.ap-southeast-2.amazonaws.com",
            "sts.cn-north-1.amazonaws.com.cn",
            "sts.us-gov-west-1.amazonaws.com",
            "sts-fips.us-east-1.amazonaws.com",
        ] {
            assert!(looks_like_sts_host(host), "{}", host);
        }

        for host in [
            "sts.amazonaws.com.evil.example",
            "iam.amazonaws.com",
            "sts.amazonaws.com:443",
            "evil-sts.amazonaws.com",
            "sts.us-east-1.amazonaws.co",
            "",
        ] {
            assert!(!looks_like_sts_host(host), "{}", host);
        }
    }
}
