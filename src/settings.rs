use anyhow::{bail, Context};

const MIN_SECRET_LEN: usize = 32;

/// Runtime settings read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub frontend_url: String,
    pub secure_cookies: bool,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process env.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} characters long");
        }

        let parsed = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            bind_addr: parsed("BIND_ADDR", "0.0.0.0"),
            port: parsed("PORT", "8080").parse().context("PORT must be a port number")?,
            jwt_secret,
            token_ttl_hours: parsed("TOKEN_TTL_HOURS", "24")
                .parse()
                .context("TOKEN_TTL_HOURS must be an integer")?,
            frontend_url: parsed("FRONTEND_URL", "http://localhost:5173"),
            secure_cookies: matches!(parsed("SECURE_COOKIES", "false").to_ascii_lowercase().as_str(), "1" | "true"),
            database_url: get("DATABASE_URL"),
            db_max_connections: parsed("DB_MAX_CONNECTIONS", "5")
                .parse()
                .context("DB_MAX_CONNECTIONS must be an integer")?,
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }
}
