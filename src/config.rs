//! Server configuration
//!
//! Built from command line arguments:
//!
//! | Arguments | Meaning |
//! |---|---|
//! | none | `127.0.0.1:7777`, no key |
//! | `<port> <connectionKey>` | `0.0.0.0:<port>` with the key |
//! | `<address> <port>` | `<address>:<port>`, no key |
//! | `<address> <port> <connectionKey>` | both |
//!
//! With two arguments, a first argument that parses as a port selects the
//! `<port> <connectionKey>` form.

use std::time::Duration;

use crate::error::ConfigError;
use crate::server::DEFAULT_POLL_INTERVAL;
use crate::transport::ListenConfig;

/// Default bind address
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";

/// Default port
pub const DEFAULT_PORT: u16 = 7777;

/// Bind address for the `<port> <connectionKey>` form
pub const ANY_ADDRESS: &str = "0.0.0.0";

/// One-line usage text
pub const USAGE: &str =
    "Usage: relay_server [<port> <connectionKey> | <address> <port> [<connectionKey>]]";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub connection_key: Option<String>,
    pub poll_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            connection_key: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ServerConfig {
    /// Parse arguments (without the program name)
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let defaults = Self::default();

        match args.as_slice() {
            [] => Ok(defaults),
            [first, second] => match first.parse::<u16>() {
                Ok(port) => Ok(Self {
                    bind_address: ANY_ADDRESS.to_string(),
                    port,
                    connection_key: Some(second.clone()),
                    ..defaults
                }),
                Err(_) => Ok(Self {
                    bind_address: first.clone(),
                    port: parse_port(second)?,
                    ..defaults
                }),
            },
            [address, port, key] => Ok(Self {
                bind_address: address.clone(),
                port: parse_port(port)?,
                connection_key: Some(key.clone()),
                ..defaults
            }),
            other => Err(ConfigError::ArgumentCount(other.len())),
        }
    }

    /// Transport listen settings
    pub fn listen_config(&self) -> ListenConfig {
        ListenConfig {
            bind_address: self.bind_address.clone(),
            port: self.port,
            connection_key: self.connection_key.clone(),
        }
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidPort(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_args_uses_defaults() {
        let config = ServerConfig::from_args(Vec::<String>::new()).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 7777);
        assert_eq!(config.poll_interval, Duration::from_millis(15));
    }

    #[test]
    fn test_port_and_key() {
        let config = ServerConfig::from_args(["9000", "secret"]).unwrap();
        assert_eq!(config.bind_address, ANY_ADDRESS);
        assert_eq!(config.port, 9000);
        assert_eq!(config.connection_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_address_and_port() {
        let config = ServerConfig::from_args(["10.0.0.5", "9000"]).unwrap();
        assert_eq!(config.bind_address, "10.0.0.5");
        assert_eq!(config.port, 9000);
        assert!(config.connection_key.is_none());
    }

    #[test]
    fn test_address_port_and_key() {
        let config = ServerConfig::from_args(["localhost", "9000", "k"]).unwrap();
        assert_eq!(config.bind_address, "localhost");
        assert_eq!(config.connection_key.as_deref(), Some("k"));

        let listen = config.listen_config();
        assert_eq!(listen.port, 9000);
        assert_eq!(listen.connection_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(
            ServerConfig::from_args(["localhost", "99999"]),
            Err(ConfigError::InvalidPort(p)) if p == "99999"
        ));
        assert!(matches!(
            ServerConfig::from_args(["localhost", "http", "k"]),
            Err(ConfigError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_wrong_argument_count() {
        assert!(matches!(
            ServerConfig::from_args(["9000"]),
            Err(ConfigError::ArgumentCount(1))
        ));
        assert!(matches!(
            ServerConfig::from_args(["a", "b", "c", "d"]),
            Err(ConfigError::ArgumentCount(4))
        ));
    }
}
