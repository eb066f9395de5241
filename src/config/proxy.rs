//! Typed proxy configuration.
//!
//! Proxy type strings are resolved here, once, to a closed enum. Unknown
//! values are rejected at configuration time instead of at dial time.

use std::fmt;
use std::str::FromStr;

use url::{Host, Url};

use crate::config::loader::ConfigError;
use crate::config::schema::ProxySection;

/// Default SOCKS port used when a proxy URL omits one.
pub const DEFAULT_SOCKS_PORT: u16 = 1080;

/// Which dial path a connection attempt takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyType {
    /// Dial the destination directly.
    #[default]
    None,
    Socks4,
    Socks5,
}

impl ProxyType {
    /// Parse an optional type string; absent means [`ProxyType::None`].
    pub fn from_optional(value: Option<&str>) -> Result<Self, ConfigError> {
        value.map_or(Ok(ProxyType::None), str::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::None => "none",
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks5 => "socks5",
        }
    }
}

impl FromStr for ProxyType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" => Ok(ProxyType::Socks5),
            _ => Err(ConfigError::UnknownProxyType(s.to_string())),
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proxy settings for one connection attempt.
///
/// `username` is the only authentication trigger: a password without a
/// username yields an anonymous handshake. `password` is only meaningful for
/// SOCKS5.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub proxy_type: ProxyType,
    pub address: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub resolve_remotely: bool,
}

impl ProxyConfig {
    /// No proxy.
    pub fn direct() -> Self {
        Self {
            proxy_type: ProxyType::None,
            address: String::new(),
            port: 0,
            username: None,
            password: None,
            resolve_remotely: true,
        }
    }

    pub fn socks4(address: impl Into<String>, port: u16) -> Self {
        Self::new(ProxyType::Socks4, address, port)
    }

    pub fn socks5(address: impl Into<String>, port: u16) -> Self {
        Self::new(ProxyType::Socks5, address, port)
    }

    fn new(proxy_type: ProxyType, address: impl Into<String>, port: u16) -> Self {
        Self {
            proxy_type,
            address: address.into(),
            port,
            username: None,
            password: None,
            resolve_remotely: true,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_remote_resolve(mut self, resolve_remotely: bool) -> Self {
        self.resolve_remotely = resolve_remotely;
        self
    }

    pub fn is_direct(&self) -> bool {
        self.proxy_type == ProxyType::None
    }

    /// Username and password for the handshake. Only a username triggers
    /// authentication; a missing password is sent as empty.
    pub fn auth(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref()?;
        Some((username, self.password.as_deref().unwrap_or_default()))
    }

    pub fn has_auth(&self) -> bool {
        self.auth().is_some()
    }

    /// `address:port` of the proxy, for logs and errors.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Build from the config file section. `url` wins over individual fields,
    /// but an unknown `type` is rejected either way.
    pub fn from_section(section: &ProxySection) -> Result<Self, ConfigError> {
        let proxy_type = ProxyType::from_optional(section.kind.as_deref())?;
        if let Some(url) = &section.url {
            return Self::from_url(url);
        }

        if proxy_type == ProxyType::None {
            return Ok(Self::direct());
        }

        Ok(Self {
            proxy_type,
            address: section.address.clone().unwrap_or_default(),
            port: section.port.unwrap_or(DEFAULT_SOCKS_PORT),
            username: section.username.clone(),
            password: section.password.clone(),
            resolve_remotely: section.resolve_remotely,
        })
    }

    /// Parse `socks4://`, `socks4a://`, `socks5://` or `socks5h://` URLs.
    ///
    /// The `a`/`h` suffixed schemes let the proxy resolve the destination;
    /// the plain ones resolve it locally. Credentials are taken verbatim.
    pub fn from_url(value: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(value)
            .map_err(|e| ConfigError::InvalidProxyUrl(format!("{value}: {e}")))?;

        let (proxy_type, resolve_remotely) = match url.scheme() {
            "socks4" => (ProxyType::Socks4, false),
            "socks4a" => (ProxyType::Socks4, true),
            "socks5" => (ProxyType::Socks5, false),
            "socks5h" => (ProxyType::Socks5, true),
            other => {
                return Err(ConfigError::InvalidProxyUrl(format!(
                    "{value}: unsupported scheme {other:?}"
                )))
            }
        };

        let address = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => {
                return Err(ConfigError::InvalidProxyUrl(format!("{value}: missing host")));
            }
        };

        let username = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self {
            proxy_type,
            address,
            port: url.port().unwrap_or(DEFAULT_SOCKS_PORT),
            username,
            password: url.password().map(str::to_string),
            resolve_remotely,
        })
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::direct()
    }
}

// Manual impl keeps the password out of logs.
impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("proxy_type", &self.proxy_type)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("resolve_remotely", &self.resolve_remotely)
            .finish()
    }
}
