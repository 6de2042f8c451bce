use anyhow::anyhow;
use chrono_tz::Tz;
use std::{env, fmt, net::SocketAddr, time::Duration};

use crate::services::live_sessions::LiveSessionsConfig;

pub const DEFAULT_FEED_CHANNEL: &str = "sessions_changes";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub time_zone: Tz,
    pub bind_addr: SocketAddr,
    pub sweep_interval: Duration,
    pub feed_channel: String,
    pub sweeper_enabled: bool,
    /// Empty means any origin.
    pub cors_allow_origins: Vec<String>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `load` uses the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "postgres://localhost:5432/careerhub".to_string());

        let jwt_secret = lookup("JWT_SECRET")
            .unwrap_or_else(|| "your-secret-key-change-this-in-production".to_string());

        let time_zone_name = lookup("APP_TIMEZONE").unwrap_or_else(|| "UTC".to_string());
        let time_zone: Tz = time_zone_name
            .parse()
            .map_err(|_| anyhow!("Invalid APP_TIMEZONE value: {}", time_zone_name))?;

        let bind_addr_raw = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_addr: SocketAddr = bind_addr_raw
            .parse()
            .map_err(|_| anyhow!("Invalid BIND_ADDR value: {}", bind_addr_raw))?;

        let sweep_seconds = match lookup("SESSION_SWEEP_INTERVAL_SECONDS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|seconds| *seconds >= 1)
                .ok_or_else(|| anyhow!("Invalid SESSION_SWEEP_INTERVAL_SECONDS value: {}", raw))?,
            None => 60,
        };

        let feed_channel = lookup("SESSION_FEED_CHANNEL")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| DEFAULT_FEED_CHANNEL.to_string());
        if !feed_channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(anyhow!("Invalid SESSION_FEED_CHANNEL value: {}", feed_channel));
        }

        let sweeper_enabled = match lookup("SESSION_SWEEPER_ENABLED") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow!("Invalid SESSION_SWEEPER_ENABLED value: {}", raw))?,
            None => true,
        };

        let cors_allow_origins = lookup("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty() && *origin != "*")
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            database_url,
            jwt_secret,
            time_zone,
            bind_addr,
            sweep_interval: Duration::from_secs(sweep_seconds),
            feed_channel,
            sweeper_enabled,
            cors_allow_origins,
        })
    }

    pub fn live_sessions(&self) -> LiveSessionsConfig {
        LiveSessionsConfig {
            sweep_interval: self.sweep_interval,
            sweeper_enabled: self.sweeper_enabled,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &mask_database_url(&self.database_url))
            .field("jwt_secret", &"***")
            .field("time_zone", &self.time_zone)
            .field("bind_addr", &self.bind_addr)
            .field("sweep_interval", &self.sweep_interval)
            .field("feed_channel", &self.feed_channel)
            .field("sweeper_enabled", &self.sweeper_enabled)
            .field("cors_allow_origins", &self.cors_allow_origins)
            .finish()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Hides the password in a connection URL.
fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "***".to_string(),
    }
}
