use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Knobs shared by every stage of the daily cycle
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch_timeout_secs: u64,
    pub notification_cap: i32,
    pub price_epsilon: Decimal,
    pub concurrency: usize,
    pub poll_interval_secs: Option<u64>,
}

/// Marketplace endpoints
#[derive(Debug, Clone)]
pub struct ShopeeConfig {
    pub api_url: String,
    pub site_url: String,
}

/// Messenger endpoint and credentials
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub token: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub shopee: ShopeeConfig,
    pub telegram: TelegramConfig,
    pub log_level: String,
    pub log_format: String,
    pub environment: String,
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = parse_var::<u32>("DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let acquire_timeout_secs = parse_var::<u64>("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(30);
        // 10 minutes idle, 30 minutes lifetime
        let idle_timeout_secs = parse_var::<u64>("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(600);
        let max_lifetime_secs = parse_var::<u64>("DATABASE_MAX_LIFETIME_SECS").unwrap_or(1800);
        let test_before_acquire = parse_var::<bool>("DATABASE_TEST_BEFORE_ACQUIRE").unwrap_or(true);

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/eyesontheprice".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let fetch_timeout_secs =
            parse_var::<u64>("FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout_secs);
        let notification_cap =
            parse_var::<i32>("NOTIFICATION_CAP").unwrap_or(defaults.notification_cap);
        let concurrency = parse_var::<usize>("CYCLE_CONCURRENCY").unwrap_or(defaults.concurrency);
        let poll_interval_secs = parse_var::<u64>("POLL_INTERVAL_SECS");

        let price_epsilon = match env::var("PRICE_EPSILON") {
            Ok(raw) => Decimal::from_str(raw.trim())
                .map_err(|e| format!("Invalid PRICE_EPSILON {}: {}", raw, e))?,
            Err(_) => defaults.price_epsilon,
        };

        if fetch_timeout_secs == 0 {
            return Err("FETCH_TIMEOUT_SECS must be greater than 0".to_string());
        }
        if notification_cap <= 0 {
            return Err("NOTIFICATION_CAP must be greater than 0".to_string());
        }
        if concurrency == 0 {
            return Err("CYCLE_CONCURRENCY must be greater than 0".to_string());
        }
        if price_epsilon.is_sign_negative() {
            return Err("PRICE_EPSILON must not be negative".to_string());
        }
        if poll_interval_secs == Some(0) {
            return Err("POLL_INTERVAL_SECS must be greater than 0 when set".to_string());
        }

        Ok(Self {
            fetch_timeout_secs,
            notification_cap,
            price_epsilon,
            concurrency,
            poll_interval_secs,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            notification_cap: 3,
            price_epsilon: Decimal::new(1, 2), // 0.01
            concurrency: 8,
            poll_interval_secs: None,
        }
    }
}

impl ShopeeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env::var("SHOPEE_API_URL").unwrap_or(defaults.api_url),
            site_url: env::var("SHOPEE_SITE_URL").unwrap_or(defaults.site_url),
        }
    }
}

impl Default for ShopeeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://shopee.sg".to_string(),
            site_url: "https://shopee.sg".to_string(),
        }
    }
}

impl TelegramConfig {
    pub fn from_env() -> Result<Self, String> {
        let token = env::var("TELEGRAM_TOKEN")
            .map_err(|_| "TELEGRAM_TOKEN environment variable is required")?;
        if token.trim().is_empty() {
            return Err("TELEGRAM_TOKEN must not be empty".to_string());
        }

        let api_url = env::var("TELEGRAM_API_URL")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());

        Ok(Self { api_url, token })
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let pipeline = PipelineConfig::from_env()?;
        let shopee = ShopeeConfig::from_env();
        let telegram = TelegramConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_FORMAT: {}. Must be one of: {:?}",
                log_format, valid_log_formats
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            database,
            pipeline,
            shopee,
            telegram,
            log_level: log_level.to_lowercase(),
            log_format: log_format.to_lowercase(),
            environment: environment.to_lowercase(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}
