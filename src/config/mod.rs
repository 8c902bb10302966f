pub mod rate_limits;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub redis_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub paseto_access_key: [u8; 32],
    pub paseto_refresh_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub refresh_ttl_days: u64,
    pub mail: Option<MailQueueConfig>,
    pub mail_from: String,
    pub pickup_window_minutes: i32,
    pub payment_ref_max_attempts: u32,
}

/// Where outbound mail jobs are handed off for rendering and delivery.
#[derive(Clone, Debug)]
pub struct MailQueueConfig {
    pub endpoint: String,
    pub region: String,
    pub queue_name: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let pickup_window_minutes: i32 = env_or_parse("PICKUP_WINDOW_MINUTES", "60")?;
        if pickup_window_minutes <= 0 {
            return Err(anyhow!("invalid PICKUP_WINDOW_MINUTES: must be positive"));
        }
        let payment_ref_max_attempts: u32 = env_or_parse("PAYMENT_REF_MAX_ATTEMPTS", "10")?;
        if payment_ref_max_attempts == 0 {
            return Err(anyhow!("invalid PAYMENT_REF_MAX_ATTEMPTS: must be at least 1"));
        }

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            paseto_access_key: env_key_32("PASETO_ACCESS_KEY")?,
            paseto_refresh_key: env_key_32("PASETO_REFRESH_KEY")?,
            access_ttl_minutes: env_or_parse("ACCESS_TTL_MINUTES", "15")?,
            refresh_ttl_days: env_or_parse("REFRESH_TTL_DAYS", "30")?,
            mail: mail_queue_from_env()?,
            mail_from: env_or("MAIL_FROM", "no-reply@sahyog.local"),
            pickup_window_minutes,
            payment_ref_max_attempts,
        })
    }
}

// The mail queue is optional, but a half-configured one is a mistake.
fn mail_queue_from_env() -> Result<Option<MailQueueConfig>> {
    let queue_name = match std::env::var("MAIL_QUEUE_NAME") {
        Ok(name) if !name.trim().is_empty() => name,
        _ => return Ok(None),
    };

    Ok(Some(MailQueueConfig {
        endpoint: env_or_err("MAIL_QUEUE_ENDPOINT")?,
        region: env_or("MAIL_QUEUE_REGION", "us-east-1"),
        queue_name,
    }))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    parse_value(key, &value)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    decode_key_32(key, &value)
}

fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}
