//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or CLI flags
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (raw, serde)
//!     → proxy.rs (typed ProxyType / ProxyConfig, fail fast on unknown types)
//!     → EstablisherConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Proxy type strings are resolved to a closed enum before any I/O happens

pub mod loader;
pub mod proxy;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use proxy::{ProxyConfig, ProxyType};
pub use schema::{ClientConfig, ObservabilityConfig, ProxySection, ServerConfig, TlsConfig};
pub use validation::{validate_config, ValidationError};
