//! Configuration module for Statuswire.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "statuswire.db")
    pub db_path: String,
    /// API token for the seeded admin user; generated when unset
    pub bootstrap_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "statuswire.db".to_string(),
            bootstrap_token: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STATUSWIRE_HTTP_PORT`: HTTP port (default: 8080)
    /// - `STATUSWIRE_DB_PATH`: Database file path (default: "statuswire.db")
    /// - `STATUSWIRE_BOOTSTRAP_TOKEN`: API token for the seeded admin user
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("STATUSWIRE_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("STATUSWIRE_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(token) = env::var("STATUSWIRE_BOOTSTRAP_TOKEN") {
            cfg.bootstrap_token = Some(token);
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "statuswire.db");
        assert!(cfg.bootstrap_token.is_none());
    }
}
