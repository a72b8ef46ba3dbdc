use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppEnvironment {
    #[default]
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
    pub permits: PermitConfig,
    pub moderation: ModerationConfig,
    pub payments: PaymentConfig,
    pub audit: AuditConfig,
    pub search: SearchConfig,
    pub ingestion: IngestionConfig,
    pub marketing: MarketingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "4001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            auth: AuthConfig::from_env()?,
            permits: PermitConfig::from_env(environment),
            moderation: ModerationConfig::from_env(),
            payments: PaymentConfig::from_env(),
            audit: AuditConfig::from_env(),
            search: SearchConfig::from_env(),
            ingestion: IngestionConfig::from_env(),
            marketing: MarketingConfig::from_env(),
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4001,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Token signing and account bootstrap settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub default_admin_email: Option<String>,
    pub bcrypt_cost: u32,
    pub secure_cookies: bool,
}

impl AuthConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let token_ttl_secs = match non_empty_var("AUTH_TOKEN_TTL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber("AUTH_TOKEN_TTL_SECS"))?,
            None => 3600,
        };
        let bcrypt_cost = match non_empty_var("BCRYPT_COST") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidNumber("BCRYPT_COST"))?,
            None => DEFAULT_BCRYPT_COST,
        };

        Ok(Self {
            jwt_secret: env::var("API_JWT_SECRET").unwrap_or_else(|_| "change_me".to_string()),
            token_ttl: Duration::from_secs(token_ttl_secs),
            default_admin_email: non_empty_var("DEFAULT_ADMIN_EMAIL")
                .map(|email| email.trim().to_ascii_lowercase()),
            bcrypt_cost,
            secure_cookies: AppEnvironment::from_str(
                &env::var("APP_ENV").unwrap_or_default(),
            )
            .is_production(),
        })
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change_me".to_string(),
            token_ttl: Duration::from_secs(3600),
            default_admin_email: None,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            secure_cookies: false,
        }
    }
}

/// Which permit provider backs verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermitProviderKind {
    #[default]
    Mock,
    Dld,
}

#[derive(Debug, Clone, Default)]
pub struct PermitConfig {
    pub provider: PermitProviderKind,
    pub trakheesi_api_base: Option<String>,
    pub trakheesi_api_key: Option<String>,
}

impl PermitConfig {
    fn from_env(environment: AppEnvironment) -> Self {
        let provider = match non_empty_var("PERMIT_PROVIDER")
            .map(|raw| raw.to_ascii_lowercase())
            .as_deref()
        {
            Some("dld") => PermitProviderKind::Dld,
            Some("mock") => PermitProviderKind::Mock,
            _ if environment.is_production() => PermitProviderKind::Dld,
            _ => PermitProviderKind::Mock,
        };

        Self {
            provider,
            trakheesi_api_base: non_empty_var("TRAKHEESI_API_BASE"),
            trakheesi_api_key: non_empty_var("TRAKHEESI_API_KEY"),
        }
    }
}

pub const DEFAULT_MODERATION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub enabled: bool,
    pub threshold: f64,
}

impl ModerationConfig {
    fn from_env() -> Self {
        let enabled = env::var("MODERATION_ENABLED")
            .map(|raw| !raw.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        let threshold = env::var("MODERATION_THRESHOLD")
            .ok()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(DEFAULT_MODERATION_THRESHOLD);

        Self { enabled, threshold }
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_MODERATION_THRESHOLD,
        }
    }
}

pub const DEFAULT_ESCROW_HOLD_DAYS: i64 = 7;
/// Upper bound for a configured hold; longer values fall back to the default.
pub const MAX_ESCROW_HOLD_DAYS: i64 = 3650;
pub const DEFAULT_AML_LIMIT_AED: f64 = 1_000_000.0;

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub escrow_hold_days: i64,
    pub aml_limit_aed: f64,
    pub bank_api_base: String,
    pub bank_api_key: Option<String>,
    pub stripe_api_base: String,
    pub stripe_secret_key: Option<String>,
    pub site_base_url: String,
}

impl PaymentConfig {
    fn from_env() -> Self {
        Self {
            escrow_hold_days: resolve_hold_days(env::var("ESCROW_HOLD_DAYS").ok().as_deref()),
            aml_limit_aed: env::var("AML_LIMIT_AED")
                .ok()
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite() && *value > 0.0)
                .unwrap_or(DEFAULT_AML_LIMIT_AED),
            bank_api_base: env::var("BANK_API_BASE")
                .unwrap_or_else(|_| "https://api.uaebank.test/v1".to_string()),
            bank_api_key: non_empty_var("BANK_API_KEY"),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            stripe_secret_key: non_empty_var("STRIPE_SECRET_KEY"),
            site_base_url: env::var("SITE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            escrow_hold_days: DEFAULT_ESCROW_HOLD_DAYS,
            aml_limit_aed: DEFAULT_AML_LIMIT_AED,
            bank_api_base: "https://api.uaebank.test/v1".to_string(),
            bank_api_key: None,
            stripe_api_base: "https://api.stripe.com/v1".to_string(),
            stripe_secret_key: None,
            site_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Negative, oversized or unparsable hold periods fall back to the default;
/// fractions floor.
pub fn resolve_hold_days(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return DEFAULT_ESCROW_HOLD_DAYS;
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && (0.0..=MAX_ESCROW_HOLD_DAYS as f64).contains(&value) => {
            value.floor() as i64
        }
        _ => DEFAULT_ESCROW_HOLD_DAYS,
    }
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub log_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("logs").join("audit.log"),
        }
    }
}

impl AuditConfig {
    fn from_env() -> Self {
        Self {
            log_path: non_empty_var("AUDIT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs").join("audit.log")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub database_path: Option<PathBuf>,
    pub admin_key: Option<String>,
    pub cache_ttl: Duration,
    pub skip_seed: bool,
    pub enforce_consent: bool,
    pub consent_service_url: Option<String>,
    pub consent_cache_ttl: Duration,
}

impl SearchConfig {
    fn from_env() -> Self {
        Self {
            database_path: non_empty_var("SEARCH_DATABASE_PATH").map(PathBuf::from),
            admin_key: non_empty_var("SEARCH_ADMIN_KEY"),
            cache_ttl: Duration::from_secs(parse_secs("SEARCH_CACHE_TTL_SECS", 60)),
            skip_seed: flag("SEARCH_SKIP_SEED"),
            enforce_consent: env::var("ENFORCE_CONSENT")
                .map(|raw| {
                    let raw = raw.trim();
                    !raw.is_empty() && !raw.eq_ignore_ascii_case("false")
                })
                .unwrap_or(false),
            consent_service_url: non_empty_var("CONSENT_SERVICE_URL"),
            consent_cache_ttl: Duration::from_secs(parse_secs("CONSENT_CACHE_TTL_SECS", 60)),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            admin_key: None,
            cache_ttl: Duration::from_secs(60),
            skip_seed: false,
            enforce_consent: false,
            consent_service_url: None,
            consent_cache_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionConfig {
    pub source_url: Option<String>,
    pub cron: Option<String>,
    pub schedule_disabled: bool,
    pub permits_check_url: Option<String>,
    pub search_service_url: Option<String>,
    pub search_admin_key: Option<String>,
}

impl IngestionConfig {
    fn from_env() -> Self {
        Self {
            source_url: non_empty_var("INGESTION_SOURCE_URL"),
            cron: non_empty_var("INGESTION_CRON"),
            schedule_disabled: flag("INGESTION_DISABLE_SCHEDULE"),
            permits_check_url: non_empty_var("PERMITS_CHECK_URL")
                .or_else(|| non_empty_var("PERMITS_SERVICE_URL")),
            search_service_url: non_empty_var("SEARCH_SERVICE_URL"),
            search_admin_key: non_empty_var("SEARCH_ADMIN_KEY"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketingConfig {
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_api_base: String,
}

impl Default for MarketingConfig {
    fn default() -> Self {
        Self {
            sendgrid_api_key: None,
            sendgrid_api_base: "https://api.sendgrid.com/v3".to_string(),
        }
    }
}

impl MarketingConfig {
    fn from_env() -> Self {
        Self {
            sendgrid_api_key: non_empty_var("SENDGRID_API_KEY"),
            sendgrid_api_base: env::var("SENDGRID_API_BASE")
                .unwrap_or_else(|_| "https://api.sendgrid.com/v3".to_string()),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn flag(key: &str) -> bool {
    env::var(key)
        .map(|raw| raw.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_secs(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber(key) => write!(f, "{key} must be a non-negative integer"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber(_) => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "PERMIT_PROVIDER",
            "MODERATION_ENABLED",
            "MODERATION_THRESHOLD",
            "ESCROW_HOLD_DAYS",
            "ENFORCE_CONSENT",
            "DEFAULT_ADMIN_EMAIL",
            "AUTH_TOKEN_TTL_SECS",
            "BCRYPT_COST",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4001);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.permits.provider, PermitProviderKind::Mock);
        assert!(config.moderation.enabled);
        assert_eq!(config.payments.escrow_hold_days, 7);
        assert!(!config.search.enforce_consent);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 4001));
        reset_env();
    }

    #[test]
    fn production_defaults_to_dld_provider() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.permits.provider, PermitProviderKind::Dld);
        assert!(config.auth.secure_cookies);
        reset_env();
    }

    #[test]
    fn moderation_only_disabled_by_literal_false() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MODERATION_ENABLED", "0");
        env::set_var("MODERATION_THRESHOLD", "-3");
        let config = AppConfig::load().expect("config loads");
        assert!(config.moderation.enabled);
        assert_eq!(config.moderation.threshold, DEFAULT_MODERATION_THRESHOLD);

        env::set_var("MODERATION_ENABLED", "FALSE");
        let config = AppConfig::load().expect("config loads");
        assert!(!config.moderation.enabled);
        reset_env();
    }

    #[test]
    fn hold_days_fall_back_on_garbage() {
        assert_eq!(resolve_hold_days(None), 7);
        assert_eq!(resolve_hold_days(Some("-1")), 7);
        assert_eq!(resolve_hold_days(Some("abc")), 7);
        assert_eq!(resolve_hold_days(Some("2.9")), 2);
        assert_eq!(resolve_hold_days(Some("0")), 0);
        assert_eq!(resolve_hold_days(Some("3650")), 3650);
        assert_eq!(resolve_hold_days(Some("3651")), 7);
        assert_eq!(resolve_hold_days(Some("1e12")), 7);
    }

    #[test]
    fn bcrypt_cost_defaults_to_ten() {
        assert_eq!(DEFAULT_BCRYPT_COST, 10);
        assert_eq!(AuthConfig::default().bcrypt_cost, 10);

        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.auth.bcrypt_cost, 10);
        reset_env();
    }

    #[test]
    fn rejects_invalid_port() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_PORT", "not-a-port");
        assert!(matches!(AppConfig::load(), Err(ConfigError::InvalidPort)));
        reset_env();
    }
}
