//! URL safety validation with private-network rejection
//!
//! Accepts only public http/https URLs. Literal IPs are classified
//! directly; hostnames are resolved through the system resolver and every
//! resolved address must be public or inside the configured allow-list.

use std::net::IpAddr;

use async_trait::async_trait;
use ipnet::IpNet;
use tracing::debug;
use url::{Host, Url};

use longform_types::{ExtractError, Result, SafetyConfig};

/// Seam for the orchestrator's URL validation, so tests can inject a
/// permissive guard.
#[async_trait]
pub trait UrlGuard: Send + Sync {
    async fn validate(&self, url: &str) -> Result<()>;
}

/// The production guard enforcing the public-network policy.
pub struct PublicUrlGuard {
    allowed_networks: Vec<IpNet>,
}

impl PublicUrlGuard {
    pub fn new(config: &SafetyConfig) -> Self {
        let allowed_networks = config
            .allowed_private_cidrs
            .iter()
            .filter_map(|raw| raw.parse::<IpNet>().ok())
            .collect();
        Self { allowed_networks }
    }

    fn is_allowed_private_resolution(&self, ip: IpAddr) -> bool {
        self.allowed_networks.iter().any(|net| net.contains(&ip))
    }
}

impl Default for PublicUrlGuard {
    fn default() -> Self {
        Self::new(&SafetyConfig::default())
    }
}

fn is_non_public_ipv4(ip: std::net::Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
        || ip.octets()[0] >= 240
}

fn is_non_public_ipv6(ip: std::net::Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_non_public_ipv4(mapped);
    }
    let segments = ip.segments();
    ip.is_loopback()
        || ip.is_multicast()
        || ip.is_unspecified()
        || (segments[0] & 0xfe00) == 0xfc00 // unique local fc00::/7
        || (segments[0] & 0xffc0) == 0xfe80 // link local fe80::/10
}

/// Whether an address belongs to a private, loopback, link-local,
/// multicast, reserved, or unspecified range.
pub fn is_non_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_non_public_ipv4(v4),
        IpAddr::V6(v6) => is_non_public_ipv6(v6),
    }
}

#[async_trait]
impl UrlGuard for PublicUrlGuard {
    async fn validate(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|_| ExtractError::DisallowedUrl("URL could not be parsed.".into()))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ExtractError::DisallowedUrl(
                "Only http/https URLs are supported.".into(),
            ));
        }

        let host = match parsed.host() {
            Some(host) => host,
            None => {
                return Err(ExtractError::DisallowedUrl("URL host is missing.".into()));
            }
        };

        let hostname = match &host {
            Host::Domain(domain) => domain.trim().to_lowercase(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        if matches!(hostname.as_str(), "localhost" | "127.0.0.1" | "::1") {
            return Err(ExtractError::DisallowedUrl(
                "Localhost URLs are not allowed.".into(),
            ));
        }

        match host {
            Host::Ipv4(ip) => {
                if is_non_public_ipv4(ip) {
                    return Err(ExtractError::DisallowedUrl(
                        "Private or non-public IP addresses are not allowed.".into(),
                    ));
                }
                Ok(())
            }
            Host::Ipv6(ip) => {
                if is_non_public_ipv6(ip) {
                    return Err(ExtractError::DisallowedUrl(
                        "Private or non-public IP addresses are not allowed.".into(),
                    ));
                }
                Ok(())
            }
            Host::Domain(domain) => {
                let port = parsed.port_or_known_default().unwrap_or(80);
                let resolved = tokio::net::lookup_host((domain, port))
                    .await
                    .map_err(|_| {
                        ExtractError::UnresolvableHost("Could not resolve URL host.".into())
                    })?
                    .map(|addr| addr.ip())
                    .collect::<Vec<_>>();
                if resolved.is_empty() {
                    return Err(ExtractError::UnresolvableHost(
                        "Could not resolve URL host.".into(),
                    ));
                }

                for ip in resolved {
                    if is_non_public_ip(ip) && !self.is_allowed_private_resolution(ip) {
                        debug!(host = %domain, %ip, "host resolved to a non-public address");
                        return Err(ExtractError::DisallowedUrl(
                            "Resolved host maps to a private or non-public IP.".into(),
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}
