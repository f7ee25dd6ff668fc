use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Environment name reported by the healthcheck (development|staging|production).
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    /// Token refill rate per client, in requests per second.
    pub rps: f64,
    /// Bucket capacity per client.
    pub burst: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub trusted_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
    pub activation_ttl_hours: u64,
    pub authentication_ttl_hours: u64,
}

/// Longest token lifetime the config accepts.
pub const MAX_TOKEN_TTL_HOURS: u64 = 24 * 365;

impl AuthConfig {
    pub fn activation_ttl(&self) -> Duration {
        Duration::from_secs(self.activation_ttl_hours * 3600)
    }

    pub fn authentication_ttl(&self) -> Duration {
        Duration::from_secs(self.authentication_ttl_hours * 3600)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailerConfig {
    pub sender: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub mailer: MailerConfig,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
        {
            Ok(app_cfg) => app_cfg,
            Err(e) => panic!("embedded default config is invalid: {}", e),
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: apollo.toml (in CWD)
        .add_source(::config::File::with_name("apollo").required(false));

    if let Ok(custom_path) = std::env::var("APOLLO_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence.
    // APOLLO__CORS__TRUSTED_ORIGINS="https://a.example https://b.example"
    builder = builder.add_source(
        ::config::Environment::with_prefix("APOLLO")
            .separator("__")
            .try_parsing(true)
            .list_separator(" ")
            .with_list_parse_key("cors.trusted_origins"),
    );

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    if !matches!(cfg.server.env.as_str(), "development" | "staging" | "production") {
        return Err(anyhow::anyhow!(
            "server.env must be one of development|staging|production, got {}",
            cfg.server.env
        ));
    }
    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }

    if cfg.limiter.enabled {
        if !(cfg.limiter.rps.is_finite() && cfg.limiter.rps > 0.0) {
            return Err(anyhow::anyhow!("limiter.rps must be a positive number"));
        }
        if cfg.limiter.burst == 0 {
            return Err(anyhow::anyhow!("limiter.burst must be > 0"));
        }
    }

    if !(4..=31).contains(&cfg.auth.bcrypt_cost) {
        return Err(anyhow::anyhow!("auth.bcrypt_cost must be in 4..=31"));
    }
    if cfg.auth.activation_ttl_hours == 0 || cfg.auth.authentication_ttl_hours == 0 {
        return Err(anyhow::anyhow!("auth token TTLs must be > 0"));
    }
    if cfg.auth.activation_ttl_hours > MAX_TOKEN_TTL_HOURS || cfg.auth.authentication_ttl_hours > MAX_TOKEN_TTL_HOURS {
        return Err(anyhow::anyhow!("auth token TTLs must be at most {} hours", MAX_TOKEN_TTL_HOURS));
    }

    for origin in &cfg.cors.trusted_origins {
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(anyhow::anyhow!("cors.trusted_origins entry is not an http(s) origin: {}", origin));
        }
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
