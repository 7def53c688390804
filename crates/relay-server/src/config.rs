//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `RELAY_PORT`: Listen port. Default: `3000`
//! - `RELAY_JWT_SECRET`: HMAC secret for token verification. Default: `CHANGE_ME`
//! - `RELAY_ALLOW_ANONYMOUS`: Admit connections without a token. Default: `true`
//! - `RELAY_ENV`: Deployment environment (`production` disables dev-only routes)
//! - `RELAY_PUBLIC_DIR`: Directory of static assets. Default: `public`

use tracing::{info, warn};

use relay_core::RelayError;

/// Secret used when `RELAY_JWT_SECRET` is unset. Fine for local
/// development, logged loudly otherwise.
pub const DEFAULT_JWT_SECRET: &str = "CHANGE_ME";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port for the HTTP/WebSocket server
    pub port: u16,
    /// HMAC secret for JWT verification and dev token minting
    pub jwt_secret: String,
    /// Whether connections without a credential are admitted
    pub allow_anonymous: bool,
    /// Whether this is a production deployment
    pub production: bool,
    /// Directory served at the root path
    pub public_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            allow_anonymous: true,
            production: false,
            public_dir: "public".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Result<Self, RelayError> {
        let port = match std::env::var("RELAY_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| RelayError::config(format!("invalid RELAY_PORT: {raw:?}")))?,
            Err(_) => 3000,
        };

        let jwt_secret =
            std::env::var("RELAY_JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());

        let allow_anonymous = match std::env::var("RELAY_ALLOW_ANONYMOUS") {
            Ok(raw) => parse_bool(&raw)
                .ok_or_else(|| RelayError::config(format!("invalid RELAY_ALLOW_ANONYMOUS: {raw:?}")))?,
            Err(_) => true,
        };

        let production = std::env::var("RELAY_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let public_dir = std::env::var("RELAY_PUBLIC_DIR").unwrap_or_else(|_| "public".to_string());

        Ok(Self {
            port,
            jwt_secret,
            allow_anonymous,
            production,
            public_dir,
        })
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Listen port: {}", self.port);
        info!(
            "Environment: {}",
            if self.production { "production" } else { "development" }
        );
        info!(
            "Anonymous connections: {}",
            if self.allow_anonymous { "allowed" } else { "rejected" }
        );
        info!("Static assets: {}", self.public_dir);
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            warn!("RELAY_JWT_SECRET is not set, using the default development secret");
        }
        if self.production {
            info!("Dev token endpoint: disabled");
        } else {
            info!("Dev token endpoint: enabled (POST /api/token)");
        }
    }

    /// Create a test configuration.
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            jwt_secret: "test-secret".to_string(),
            ..Self::default()
        }
    }

    /// Create a test configuration for a production deployment.
    #[cfg(test)]
    pub fn test_production() -> Self {
        Self {
            jwt_secret: "test-secret".to_string(),
            production: true,
            ..Self::default()
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.jwt_secret, DEFAULT_JWT_SECRET);
        assert!(config.allow_anonymous);
        assert!(!config.production);
        assert_eq!(config.public_dir, "public");
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }
}
