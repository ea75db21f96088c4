use std::time::Duration;

use kaartwerk_realtime::SweepConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Disconnect-sweep debounce delays for the lock and presence registries.
    pub sweep: SweepConfig,
    /// JWT token configuration (secret, expiry duration).
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `LOCK_SWEEP_DELAY_MS`     | `500`                   |
    /// | `PRESENCE_SWEEP_DELAY_MS` | `1000`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let defaults = SweepConfig::default();
        let lock_sweep_ms: u64 = std::env::var("LOCK_SWEEP_DELAY_MS")
            .unwrap_or_else(|_| defaults.lock_delay.as_millis().to_string())
            .parse()
            .expect("LOCK_SWEEP_DELAY_MS must be a valid u64");
        let presence_sweep_ms: u64 = std::env::var("PRESENCE_SWEEP_DELAY_MS")
            .unwrap_or_else(|_| defaults.presence_delay.as_millis().to_string())
            .parse()
            .expect("PRESENCE_SWEEP_DELAY_MS must be a valid u64");

        let sweep = SweepConfig {
            lock_delay: Duration::from_millis(lock_sweep_ms),
            presence_delay: Duration::from_millis(presence_sweep_ms),
        };

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            sweep,
            jwt,
        }
    }
}
