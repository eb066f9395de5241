//! Duplex byte streams and the direct dial path.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::DialError;
use crate::net::tls::TlsContext;

/// Anything the protocol engine can read from and write to.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// An open transport: plain TCP, a SOCKS tunnel, or TLS over either.
pub type Transport = Box<dyn AsyncStream>;

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Open a TCP connection to `destination`, optionally under TLS.
pub async fn open_direct(
    destination: &Destination,
    tls: Option<&TlsContext>,
    server_name: Option<&str>,
) -> Result<Transport, DialError> {
    let tcp = TcpStream::connect((destination.host.as_str(), destination.port))
        .await
        .map_err(|e| DialError::connect(destination.to_string(), e))?;

    if let Err(e) = tcp.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    secure(tcp, tls, server_name).await
}

/// Wrap an established TCP stream in TLS when a context is given.
pub(crate) async fn secure(
    tcp: TcpStream,
    tls: Option<&TlsContext>,
    server_name: Option<&str>,
) -> Result<Transport, DialError> {
    let Some(tls) = tls else {
        return Ok(Box::new(tcp));
    };
    let server_name = server_name.ok_or_else(|| DialError::InvalidServerName(String::new()))?;
    let stream = tls.handshake(server_name, tcp).await?;
    Ok(Box::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn destination_display() {
        assert_eq!(Destination::new("imap.example.com", 993).to_string(), "imap.example.com:993");
        assert_eq!(Destination::new("::1", 143).to_string(), "[::1]:143");
    }

    #[tokio::test]
    async fn direct_plain_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hello").await.unwrap();
        });

        let destination = Destination::new("127.0.0.1", addr.port());
        let mut transport = open_direct(&destination, None, None).await.unwrap();
        let mut buf = [0u8; 5];
        transport.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let destination = Destination::new("127.0.0.1", addr.port());
        let err = open_direct(&destination, None, None).await.err().unwrap();
        assert!(matches!(err, DialError::Connect { ref addr, .. } if addr == &destination.to_string()));
    }
}
