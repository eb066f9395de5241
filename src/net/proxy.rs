//! SOCKS4/SOCKS5 dialing.
//!
//! # Responsibilities
//! - Open a tunnel to the destination through a SOCKS proxy
//! - Resolve the destination locally or leave it to the proxy
//! - Negotiate TLS with the destination inside the tunnel
//!
//! The handshake bytes themselves come from `tokio-socks`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tokio_socks::IntoTargetAddr;

use crate::error::DialError;
use crate::net::tls::TlsContext;
use crate::net::transport::{secure, Destination, Transport};

/// SOCKS5 username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Protocol version together with the authentication it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocksHandshake {
    Socks4 { user_id: Option<String> },
    Socks5 { auth: Option<Credentials> },
}

impl SocksHandshake {
    pub fn name(&self) -> &'static str {
        match self {
            SocksHandshake::Socks4 { .. } => "socks4",
            SocksHandshake::Socks5 { .. } => "socks5",
        }
    }

    pub fn is_anonymous(&self) -> bool {
        match self {
            SocksHandshake::Socks4 { user_id } => user_id.is_none(),
            SocksHandshake::Socks5 { auth } => auth.is_none(),
        }
    }
}

/// Everything needed to reach `destination` through a proxy.
#[derive(Debug, Clone)]
pub struct SocksDial {
    pub proxy: Destination,
    pub handshake: SocksHandshake,
    pub destination: Destination,
    /// Send the host name to the proxy instead of resolving it here.
    pub remote_resolve: bool,
    pub tls: Option<TlsContext>,
    /// SNI for the destination; set whenever `tls` is.
    pub server_name: Option<String>,
}

impl SocksDial {
    /// Proxy handshake, tunnel to the destination, then optional TLS.
    pub async fn open(&self) -> Result<Transport, DialError> {
        let tunnel = if self.remote_resolve {
            self.tunnel((self.destination.host.as_str(), self.destination.port))
                .await
        } else {
            let addr = self.resolve_locally().await?;
            self.tunnel(addr).await
        };
        let tcp = tunnel.map_err(|e| DialError::proxy(self.proxy.to_string(), e))?;

        tracing::debug!(
            proxy = %self.proxy,
            destination = %self.destination,
            handshake = self.handshake.name(),
            "Proxy tunnel established"
        );

        secure(tcp, self.tls.as_ref(), self.server_name.as_deref()).await
    }

    async fn tunnel<'t, T>(&self, target: T) -> Result<TcpStream, tokio_socks::Error>
    where
        T: IntoTargetAddr<'t>,
    {
        let proxy = (self.proxy.host.as_str(), self.proxy.port);
        match &self.handshake {
            SocksHandshake::Socks4 { user_id: None } => {
                Ok(Socks4Stream::connect(proxy, target).await?.into_inner())
            }
            SocksHandshake::Socks4 { user_id: Some(user_id) } => {
                Ok(Socks4Stream::connect_with_userid(proxy, target, user_id)
                    .await?
                    .into_inner())
            }
            SocksHandshake::Socks5 { auth: None } => {
                Ok(Socks5Stream::connect(proxy, target).await?.into_inner())
            }
            SocksHandshake::Socks5 { auth: Some(creds) } => Ok(Socks5Stream::connect_with_password(
                proxy,
                target,
                &creds.username,
                &creds.password,
            )
            .await?
            .into_inner()),
        }
    }

    async fn resolve_locally(&self) -> Result<SocketAddr, DialError> {
        let host = &self.destination.host;
        let resolve_error = |source: std::io::Error| DialError::Resolve {
            host: host.clone(),
            source: Arc::new(source),
        };

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), self.destination.port))
            .await
            .map_err(resolve_error)?
            .collect();

        // SOCKS4 without the 4a extension only carries IPv4 addresses.
        let chosen = match self.handshake {
            SocksHandshake::Socks4 { .. } => addrs.iter().find(|a| a.is_ipv4()),
            SocksHandshake::Socks5 { .. } => addrs.first(),
        };

        chosen.copied().ok_or_else(|| {
            resolve_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no usable address",
            ))
        })
    }
}
