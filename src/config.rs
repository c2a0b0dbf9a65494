use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const DEFAULT_DATABASE_URL: &str = "sqlite:forgestudy.db?mode=rwc";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub app_env: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expires_in: String,
    pub intake_secret: Option<String>,
    pub frontend_url: String,
    pub auth_rate_limit: RateLimitSettings,
    /// Honour `X-Forwarded-For` when keying the rate limiter.
    pub trust_proxy: bool,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub window_ms: u64,
    pub max: u64,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub price_monthly: Option<String>,
    pub price_annual: Option<String>,
    pub trial_days: u32,
    pub api_base: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_string("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = env_string("HOST")
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = env_string("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Self {
            host,
            port,
            log_level,
            app_env: env_string("APP_ENV").unwrap_or_else(|| "development".to_string()),
            database_url: env_string("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: env_u64("DATABASE_MAX_CONNECTIONS")
                .map(|value| value.clamp(1, 100) as u32)
                .unwrap_or(10),
            jwt_secret: env_string("JWT_SECRET").unwrap_or_default(),
            jwt_expires_in: env_string("JWT_EXPIRES_IN").unwrap_or_else(|| "24h".to_string()),
            intake_secret: env_string("INTAKE_SECRET"),
            frontend_url: env_string("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            auth_rate_limit: RateLimitSettings {
                window_ms: env_u64("AUTH_RATE_LIMIT_WINDOW_MS").unwrap_or(5 * 60 * 1000),
                max: env_u64("AUTH_RATE_LIMIT_MAX").unwrap_or(30),
            },
            trust_proxy: env_bool("TRUST_PROXY").unwrap_or(false),
            billing: BillingConfig {
                secret_key: env_string("STRIPE_SECRET_KEY"),
                webhook_secret: env_string("STRIPE_WEBHOOK_SECRET"),
                price_monthly: env_string("STRIPE_PRICE_MONTHLY"),
                price_annual: env_string("STRIPE_PRICE_ANNUAL"),
                trial_days: env_u64("STRIPE_TRIAL_DAYS").unwrap_or(7) as u32,
                api_base: env_string("STRIPE_API_BASE")
                    .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
            },
        }
    }

    /// Configuration for tests and local tooling: SQLite at `database_url`,
    /// fixed secrets, no payment provider.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            log_level: "warn".to_string(),
            app_env: "test".to_string(),
            database_url: database_url.into(),
            database_max_connections: 1,
            jwt_secret: "forgestudy-test-secret".to_string(),
            jwt_expires_in: "1h".to_string(),
            intake_secret: Some("intake-test-secret".to_string()),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            auth_rate_limit: RateLimitSettings {
                window_ms: 60_000,
                max: 1_000,
            },
            trust_proxy: false,
            billing: BillingConfig {
                secret_key: None,
                webhook_secret: Some("whsec_test".to_string()),
                price_monthly: Some("price_monthly_test".to_string()),
                price_annual: Some("price_annual_test".to_string()),
                trial_days: 7,
                api_base: DEFAULT_STRIPE_API_BASE.to_string(),
            },
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}

pub fn env_string(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse::<u64>().ok()
}

pub fn env_bool(key: &str) -> Option<bool> {
    let normalized = env_string(key)?.to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
