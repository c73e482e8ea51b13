use chrono_tz::Tz;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct RequestServiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    /// When set, notification dedup keys live in Redis instead of process memory.
    pub redis_url: Option<String>,
    pub smtp: SmtpConfig,
    pub scheduler: SchedulerConfig,
    pub currency_symbol: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
    pub reminder_days_before: i64,
    pub overdue_lookback_days: i64,
    pub dedup_retention_days: u32,
    pub run_on_startup: bool,
}

impl SchedulerConfig {
    /// Six-field cron expression (seconds first) for the daily run.
    pub fn cron_expression(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hour: 8,
            minute: 0,
            timezone: chrono_tz::Asia::Manila,
            reminder_days_before: 3,
            overdue_lookback_days: 30,
            dedup_retention_days: 7,
            run_on_startup: false,
        }
    }
}

impl RequestServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_prod();

        let scheduler = SchedulerConfig {
            hour: parse_env("REMINDER_HOUR", "8", is_prod)?,
            minute: parse_env("REMINDER_MINUTE", "0", is_prod)?,
            timezone: parse_env("REMINDER_TIMEZONE", "Asia/Manila", is_prod)?,
            reminder_days_before: parse_env("REMINDER_DAYS_BEFORE", "3", is_prod)?,
            overdue_lookback_days: parse_env("OVERDUE_LOOKBACK_DAYS", "30", is_prod)?,
            dedup_retention_days: parse_env("DEDUP_RETENTION_DAYS", "7", is_prod)?,
            run_on_startup: env::var("RUN_ON_STARTUP")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        };

        if scheduler.hour > 23 || scheduler.minute > 59 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid reminder time {:02}:{:02}",
                scheduler.hour,
                scheduler.minute
            )));
        }

        Ok(RequestServiceConfig {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "request-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: get_env("SMTP_PORT", Some("587"), is_prod)?
                    .parse()
                    .unwrap_or(587),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Service Requests"), is_prod)?,
                enabled: env::var("SMTP_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            scheduler,
            currency_symbol: env::var("CURRENCY_SYMBOL").unwrap_or_else(|_| "₱".to_string()),
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}
