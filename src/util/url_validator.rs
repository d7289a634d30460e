use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a URL is refused as a feed or article address.
///
/// Besides parse failures these guard against SSRF (Server-Side Request
/// Forgery): the OPML outline and feed entries are externally controlled, and
/// both the fetcher and the headless browser would otherwise follow them into
/// the host's network.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a feed locator or article link before it is fetched or rendered.
///
/// Rejects non-HTTP(S) schemes, localhost, and private, link-local or
/// unspecified IP literals. Hostnames are not resolved.
///
/// # Examples
///
/// ```
/// use feedpage::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://localhost/feed").is_err());
/// assert!(validate_url("http://192.168.1.1/feed").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    AddressPolicy::PublicOnly.validate(url_str)
}

/// Which hosts feed and article requests may reach.
///
/// Only the scheme check applies under `AllowPrivate`, for self-hosted feeds
/// on the local network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressPolicy {
    #[default]
    PublicOnly,
    AllowPrivate,
}

impl AddressPolicy {
    pub fn from_allow_private(allow: bool) -> Self {
        if allow {
            Self::AllowPrivate
        } else {
            Self::PublicOnly
        }
    }

    pub fn validate(self, url_str: &str) -> Result<Url, UrlValidationError> {
        let url = Url::parse(url_str)?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
        }

        if self == Self::PublicOnly {
            check_public_host(&url)?;
        }
        Ok(url)
    }
}

fn check_public_host(url: &Url) -> Result<(), UrlValidationError> {
    if let Some(host) = url.host_str() {
        if host == "localhost" {
            return Err(UrlValidationError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(())
}

/// Hostname of `link`, or `None` when it does not parse or has no host.
pub fn hostname(link: &str) -> Option<String> {
    Url::parse(link)
        .ok()?
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
