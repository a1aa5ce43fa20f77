//! Server configuration from the environment.

use axum::http::HeaderValue;
use tracing::warn;

use atomic_core::defaults;

/// Request bodies above this are rejected (uploads included).
pub const BODY_LIMIT_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Raw `CORS_ORIGINS` value.
    pub cors_origins: String,
}

impl ServerConfig {
    /// `DATABASE_URL`, `HOST`, `PORT`, `CORS_ORIGINS`.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/atomic_notes".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults::SERVER_PORT),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| defaults::CORS_ORIGINS.to_string()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a comma-separated origin list. Blank input yields the defaults;
/// unparseable entries are dropped with a warning.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    let raw = if raw.trim().is_empty() {
        defaults::CORS_ORIGINS
    } else {
        raw
    };

    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origins_split_and_trimmed() {
        let origins = parse_allowed_origins("https://a.example, http://localhost:5173 ,");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://a.example");
        assert_eq!(origins[1], "http://localhost:5173");
    }

    #[test]
    fn test_blank_origins_use_defaults() {
        let origins = parse_allowed_origins("  ");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "http://localhost:5173");
        assert_eq!(origins[1], "http://localhost:3000");
    }

    #[test]
    fn test_invalid_origin_dropped() {
        let origins = parse_allowed_origins("http://ok.example,bad\norigin");
        assert_eq!(origins.len(), 1);
    }
}
