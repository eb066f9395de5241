//! Mock IMAP servers and SOCKS proxies shared by the integration tests.

#![allow(dead_code)]

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Keep the socket open until the peer goes away.
async fn hold<S: AsyncRead + Unpin>(mut socket: S) {
    let mut buf = [0u8; 256];
    while let Ok(n) = socket.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}

/// IMAP server that sends `greeting` (CRLF appended) on every connection.
pub async fn start_imap_server(greeting: &'static str) -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let line = format!("{greeting}\r\n");
                if socket.write_all(line.as_bytes()).await.is_ok() {
                    hold(socket).await;
                }
            });
        }
    });
    addr
}

/// A server that never says anything.
pub struct SilentServer {
    pub addr: SocketAddr,
    closed: Arc<AtomicUsize>,
}

impl SilentServer {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections the peer has closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait up to `limit` for at least one closed connection.
    pub async fn wait_closed(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if self.closed() > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.closed() > 0
    }
}

/// Server that accepts connections and never says anything.
pub async fn start_silent_server() -> SilentServer {
    let (listener, addr) = bind().await;
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closed);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                hold(socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
    });
    SilentServer { addr, closed }
}

/// IMAP-over-TLS server with a fresh self-signed certificate for `localhost`.
pub struct TlsImapServer {
    pub addr: SocketAddr,
    /// PEM file holding the server certificate, usable as a trust root.
    pub ca_file: PathBuf,
    server_names: Arc<Mutex<Vec<Option<String>>>>,
}

impl TlsImapServer {
    /// SNI received in each ClientHello, in connection order.
    pub fn server_names(&self) -> Vec<Option<String>> {
        self.server_names.lock().unwrap().clone()
    }
}

impl Drop for TlsImapServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.ca_file);
    }
}

pub async fn start_tls_imap_server(greeting: &'static str) -> TlsImapServer {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_pem = cert.pem();
    let key_pem = key_pair.serialize_pem();

    let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut key_pem.as_bytes()).unwrap().unwrap();
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let (listener, addr) = bind().await;
    let ca_file = std::env::temp_dir().join(format!(
        "socks-imap-ca-{}-{}.pem",
        std::process::id(),
        addr.port()
    ));
    std::fs::write(&ca_file, &cert_pem).unwrap();

    let server_names = Arc::new(Mutex::new(Vec::new()));
    let names = Arc::clone(&server_names);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let names = Arc::clone(&names);
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(socket).await else {
                    return;
                };
                let sni = tls.get_ref().1.server_name().map(str::to_string);
                names.lock().unwrap().push(sni);

                let line = format!("{greeting}\r\n");
                if tls.write_all(line.as_bytes()).await.is_ok() && tls.flush().await.is_ok() {
                    hold(tls).await;
                }
            });
        }
    });

    TlsImapServer {
        addr,
        ca_file,
        server_names,
    }
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let (listener, addr) = bind().await;
    drop(listener);
    addr.port()
}

/// What a mock proxy saw during its handshakes.
#[derive(Debug, Default, Clone)]
pub struct HandshakeLog {
    /// SOCKS5 methods offered by the client.
    pub offered_methods: Vec<u8>,
    /// SOCKS5 method chosen by the proxy.
    pub method: Option<u8>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// SOCKS4 user id.
    pub user_id: Option<String>,
    /// Destination as requested: `host:port`.
    pub target: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum ProxyMode {
    /// Complete the handshake and relay traffic.
    Relay,
    /// Wait, then reject every authentication method.
    RejectAfter(Duration),
}

/// A running mock proxy.
pub struct MockProxy {
    pub addr: SocketAddr,
    log: Arc<Mutex<HandshakeLog>>,
}

impl MockProxy {
    pub fn log(&self) -> HandshakeLog {
        self.log.lock().unwrap().clone()
    }
}

/// SOCKS5 proxy supporting anonymous and username/password authentication.
pub async fn start_socks5_proxy(mode: ProxyMode) -> MockProxy {
    let (listener, addr) = bind().await;
    let log = Arc::new(Mutex::new(HandshakeLog::default()));
    let shared = Arc::clone(&log);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let log = Arc::clone(&shared);
            tokio::spawn(async move {
                let _ = socks5_session(socket, mode, log).await;
            });
        }
    });
    MockProxy { addr, log }
}

async fn socks5_session(
    mut socket: TcpStream,
    mode: ProxyMode,
    log: Arc<Mutex<HandshakeLog>>,
) -> std::io::Result<()> {
    let version = socket.read_u8().await?;
    assert_eq!(version, 0x05);
    let count = socket.read_u8().await?;
    let mut methods = vec![0u8; count as usize];
    socket.read_exact(&mut methods).await?;
    log.lock().unwrap().offered_methods = methods.clone();

    if let ProxyMode::RejectAfter(delay) = mode {
        tokio::time::sleep(delay).await;
        socket.write_all(&[0x05, 0xff]).await?;
        return Ok(());
    }

    let method = if methods.contains(&0x02) { 0x02 } else { 0x00 };
    log.lock().unwrap().method = Some(method);
    socket.write_all(&[0x05, method]).await?;

    if method == 0x02 {
        let _version = socket.read_u8().await?;
        let username = read_prefixed(&mut socket).await?;
        let password = read_prefixed(&mut socket).await?;
        {
            let mut log = log.lock().unwrap();
            log.username = Some(username);
            log.password = Some(password);
        }
        socket.write_all(&[0x01, 0x00]).await?;
    }

    let mut request = [0u8; 4];
    socket.read_exact(&mut request).await?;
    let host = match request[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            socket.read_exact(&mut ip).await?;
            Ipv4Addr::from(ip).to_string()
        }
        0x03 => read_prefixed(&mut socket).await?,
        0x04 => {
            let mut ip = [0u8; 16];
            socket.read_exact(&mut ip).await?;
            Ipv6Addr::from(ip).to_string()
        }
        other => panic!("unexpected address type {other}"),
    };
    let port = socket.read_u16().await?;
    log.lock().unwrap().target = Some(format!("{host}:{port}"));

    let mut upstream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(upstream) => upstream,
        Err(_) => {
            socket.write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
            return Ok(());
        }
    };
    socket.write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await?;
    tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
    Ok(())
}

async fn read_prefixed(socket: &mut TcpStream) -> std::io::Result<String> {
    let len = socket.read_u8().await?;
    let mut buf = vec![0u8; len as usize];
    socket.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn read_nul_terminated(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    loop {
        match socket.read_u8().await? {
            0 => break,
            b => buf.push(b),
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// SOCKS4/4a proxy that records the user id.
pub async fn start_socks4_proxy() -> MockProxy {
    let (listener, addr) = bind().await;
    let log = Arc::new(Mutex::new(HandshakeLog::default()));
    let shared = Arc::clone(&log);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let log = Arc::clone(&shared);
            tokio::spawn(async move {
                let _ = socks4_session(socket, log).await;
            });
        }
    });
    MockProxy { addr, log }
}

async fn socks4_session(mut socket: TcpStream, log: Arc<Mutex<HandshakeLog>>) -> std::io::Result<()> {
    let mut header = [0u8; 8];
    socket.read_exact(&mut header).await?;
    assert_eq!(header[0], 0x04);
    let port = u16::from_be_bytes([header[2], header[3]]);
    let ip = Ipv4Addr::new(header[4], header[5], header[6], header[7]);

    let user_id = read_nul_terminated(&mut socket).await?;
    // 0.0.0.x with x != 0 means a host name follows (SOCKS4a).
    let host = if ip.octets()[..3] == [0, 0, 0] && ip.octets()[3] != 0 {
        read_nul_terminated(&mut socket).await?
    } else {
        ip.to_string()
    };
    {
        let mut log = log.lock().unwrap();
        log.user_id = Some(user_id).filter(|u| !u.is_empty());
        log.target = Some(format!("{host}:{port}"));
    }

    let mut upstream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(upstream) => upstream,
        Err(_) => {
            socket.write_all(&[0x00, 0x5b, 0, 0, 0, 0, 0, 0]).await?;
            return Ok(());
        }
    };
    socket.write_all(&[0x00, 0x5a, 0, 0, 0, 0, 0, 0]).await?;
    tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
    Ok(())
}
