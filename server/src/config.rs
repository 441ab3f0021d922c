//! Environment-variable configuration.

use std::time::Duration;

use volsyncd::parse_timeout;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(300);

/// Runtime configuration for the server process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP front door listens on.
    pub port: u16,
    /// Timeout applied to jobs that don't carry their own.
    pub default_timeout: Duration,
}

impl Config {
    /// Reads `PORT` and `SYNC_TIMEOUT` from the environment, falling back
    /// to the defaults on missing or unparseable values.
    ///
    /// `SYNC_TIMEOUT` accepts a duration string (`"45s"`, `"10m"`) or bare
    /// seconds.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let default_timeout = std::env::var("SYNC_TIMEOUT")
            .ok()
            .and_then(|v| parse_timeout(&v).ok())
            .unwrap_or(DEFAULT_SYNC_TIMEOUT);

        Self {
            port,
            default_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}
