//! Minimal engine that reads the server greeting.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::error::{Error, Result};
use crate::net::Transport;
use crate::session::{ProtocolEngine, SessionState};

/// Longest greeting line accepted, CRLF included.
const MAX_LINE: u64 = 8 * 1024;

/// Reads untagged greeting lines (`* OK`, `* PREAUTH`, `* BYE`).
pub struct GreetingEngine {
    reader: BufReader<Transport>,
    state: SessionState,
    greeting: Option<String>,
}

impl GreetingEngine {
    /// The greeting line without the leading `* ` and trailing CRLF.
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    /// Hand the transport to a full engine. Bytes already buffered past the
    /// greeting stay in the reader.
    pub fn into_inner(self) -> BufReader<Transport> {
        self.reader
    }

    async fn read_greeting(&mut self) -> Result<()> {
        let mut buf = Vec::new();
        let n = (&mut self.reader)
            .take(MAX_LINE)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| Error::Protocol(format!("failed to read greeting: {e}")))?;

        if n == 0 {
            return Err(Error::Protocol("connection closed before greeting".into()));
        }
        if !buf.ends_with(b"\n") {
            return Err(Error::Protocol(format!("greeting longer than {MAX_LINE} bytes")));
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        tracing::debug!(greeting = %line, "Server greeting");

        let text = line
            .strip_prefix("* ")
            .ok_or_else(|| Error::Protocol(format!("unexpected greeting {line:?}")))?;
        let status = text.split(' ').next().unwrap_or_default();

        self.state = match status.to_ascii_uppercase().as_str() {
            "OK" => SessionState::NonAuthenticated,
            "PREAUTH" => SessionState::Authenticated,
            "BYE" => {
                self.state = SessionState::Logout;
                return Err(Error::Protocol(format!("server refused session: {text}")));
            }
            _ => return Err(Error::Protocol(format!("unexpected greeting {line:?}"))),
        };
        self.greeting = Some(text.to_string());
        Ok(())
    }
}

impl ProtocolEngine for GreetingEngine {
    fn from_transport(transport: Transport) -> Self {
        Self {
            reader: BufReader::new(transport),
            state: SessionState::Started,
            greeting: None,
        }
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn wait<'a>(
        &'a mut self,
        states: &'a [SessionState],
    ) -> impl std::future::Future<Output = Result<()>> + Send + 'a {
        async move {
            loop {
                if states.contains(&self.state) {
                    return Ok(());
                }
                match self.state {
                    SessionState::Started => self.read_greeting().await?,
                    other => {
                        return Err(Error::Protocol(format!(
                            "session is {other}, expected one of {states:?}"
                        )))
                    }
                }
            }
        }
    }
}
