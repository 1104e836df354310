//! config/app_config.rs
//! Configuración del servicio, leída del entorno (después de cargar `.env`).

use anyhow::{anyhow, Context, Result};
use std::{env, time::Duration};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub operator_email: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Credencial compartida que esperamos en el header `X-API-Key`.
    pub service_api_key: String,
    pub instantly_api_url: String,
    /// Key compartida de Instantly, para requests sin orgId.
    pub instantly_api_key: Option<String>,
    pub key_service_url: String,
    pub key_service_api_key: String,
    pub runs_service_url: String,
    pub runs_service_api_key: String,
    pub public_url: String,
    pub smtp: Option<SmtpConfig>,
    /// 0 desactiva el poller en segundo plano.
    pub health_poll_interval_secs: u64,
    pub health_poll_delay_ms: u64,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = parse_or("PORT", 3011u16)?;

        let smtp = match (optional("SMTP_HOST"), optional("OPERATOR_EMAIL")) {
            (Some(host), Some(operator_email)) => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587u16)?,
                user: required("SMTP_USER")?,
                pass: required("SMTP_PASS")?,
                operator_email,
            }),
            _ => None,
        };

        Ok(AppConfig {
            port,
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./data/instantly.db".to_string()),
            service_api_key: required("SERVICE_API_KEY")?,
            instantly_api_url: optional("INSTANTLY_API_URL")
                .unwrap_or_else(|| "https://api.instantly.ai".to_string()),
            instantly_api_key: optional("INSTANTLY_API_KEY"),
            key_service_url: required("KEY_SERVICE_URL")?,
            key_service_api_key: required("KEY_SERVICE_API_KEY")?,
            runs_service_url: required("RUNS_SERVICE_URL")?,
            runs_service_api_key: required("RUNS_SERVICE_API_KEY")?,
            public_url: optional("PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            smtp,
            health_poll_interval_secs: parse_or("HEALTH_POLL_INTERVAL_SECS", 300u64)?,
            health_poll_delay_ms: parse_or("HEALTH_POLL_DELAY_MS", 500u64)?,
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 30u64)?,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// URL que el cliente registra en Instantly para mandarnos los eventos.
    pub fn webhook_url(&self) -> String {
        format!("{}/webhooks/instantly", self.public_url.trim_end_matches('/'))
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| anyhow!("Missing required environment variable {}", name))
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(name) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {}", name, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        AppConfig {
            port: 3011,
            database_url: "sqlite::memory:".to_string(),
            service_api_key: "test-service-key".to_string(),
            instantly_api_url: "http://instantly.invalid".to_string(),
            instantly_api_key: Some("shared-instantly-key".to_string()),
            key_service_url: "http://keys.invalid".to_string(),
            key_service_api_key: "keys".to_string(),
            runs_service_url: "http://runs.invalid".to_string(),
            runs_service_api_key: "runs".to_string(),
            public_url: "https://instantly.example.com/".to_string(),
            smtp: None,
            health_poll_interval_secs: 0,
            health_poll_delay_ms: 0,
            http_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_url_ignores_trailing_slash() {
        let mut config = AppConfig::for_tests();
        assert_eq!(
            config.webhook_url(),
            "https://instantly.example.com/webhooks/instantly"
        );
        config.public_url = "http://localhost:3011".to_string();
        assert_eq!(config.webhook_url(), "http://localhost:3011/webhooks/instantly");
    }
}
