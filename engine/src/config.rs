//! Process configuration, read from the environment.
//!
//! Config loading itself is outside the engine's core contract - the
//! functional core, the LSS and the coordinator never read an environment
//! variable - but the binary that wires them together still needs
//! somewhere to get `DATABASE_URL` from, so it lives here rather than
//! inline in `main`.

use std::env;

/// Process configuration.
pub struct Config {
    /// PostgreSQL connection string. Required unless `test_mode` is set.
    pub database_url: Option<String>,
    /// SendGrid API key. If absent, outbound email delivery is a no-op
    /// rather than an error - useful for environments that don't send
    /// real email.
    pub sendgrid_api_key: Option<String>,
    /// Run the self-check scenario suite against an in-memory store and
    /// exit, instead of serving against `database_url`.
    pub test_mode: bool,
}

impl Config {
    /// Load configuration from the process environment (after loading a
    /// `.env` file, if present).
    pub fn load() -> Self {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found, reading environment as-is");
        }

        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            sendgrid_api_key: env::var("SENDGRID_API_KEY").ok().filter(|s| !s.is_empty()),
            test_mode: env::var("TEST_MODE")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
                .unwrap_or(false),
        }
    }
}
