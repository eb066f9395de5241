//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::proxy::ProxyConfig;
use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading and interpretation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("unknown proxy type {0:?} (expected \"socks4\" or \"socks5\")")]
    UnknownProxyType(String),

    #[error("invalid proxy URL {0}")]
    InvalidProxyUrl(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = toml::from_str(content)?;

    // Proxy type and URL errors surface as themselves, ahead of field checks.
    ProxyConfig::from_section(&config.proxy)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyType;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn full_document() {
        let config = parse_config(
            r#"
            [server]
            host = "imap.example.com"
            port = 993
            timeout_secs = 15.0

            [tls]
            enabled = true

            [proxy]
            type = "socks5"
            address = "127.0.0.1"
            port = 1080
            username = "alice"
            password = "secret"
            resolve_remotely = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "imap.example.com");
        assert_eq!(config.effective_port(), 993);
        assert_eq!(config.server.timeout_secs, Some(15.0));
        assert!(config.tls.enabled);
        assert_eq!(config.proxy.kind.as_deref(), Some("socks5"));
        assert!(!config.proxy.resolve_remotely);
        assert_eq!(
            ProxyType::from_optional(config.proxy.kind.as_deref()).unwrap(),
            ProxyType::Socks5
        );
    }

    #[test]
    fn syntax_error() {
        let err = parse_config("[server\nhost = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_error_lists_every_problem() {
        let err = parse_config(
            r#"
            [server]
            host = ""
            port = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_proxy_type_in_file() {
        let err = parse_config(
            r#"
            [proxy]
            type = "socks6"
            address = "127.0.0.1"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProxyType(ref t) if t == "socks6"));
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("socks-imap-{}.toml", std::process::id()));
        fs::write(&path, "[server]\nhost = \"mail.test\"\n").unwrap();
        let config = load_config(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.server.host, "mail.test");
    }

    #[test]
    fn missing_file() {
        let err = load_config(Path::new("/nonexistent/socks-imap.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
