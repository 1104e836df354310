//! services/instantly_client.rs
//! Wrapper fino sobre la API v2 de Instantly. Cada llamada recibe la API key
//! a usar, porque cada organización tiene la suya.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::{
    errors::PlatformError,
    models::instantly_model::{
        Account, AccountList, AddLeadRequest, CampaignDetails, CampaignSettings,
        CreateCampaignRequest,
    },
};

/// Intentos totales ante fallos transitorios.
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;

#[async_trait]
pub trait DeliveryPlatform: Send + Sync {
    async fn list_accounts(&self, api_key: &str) -> Result<Vec<Account>, PlatformError>;

    async fn create_campaign(
        &self,
        api_key: &str,
        req: &CreateCampaignRequest,
    ) -> Result<CampaignDetails, PlatformError>;

    async fn update_campaign(
        &self,
        api_key: &str,
        campaign_id: &str,
        settings: &CampaignSettings,
    ) -> Result<(), PlatformError>;

    async fn add_lead(&self, api_key: &str, lead: &AddLeadRequest) -> Result<(), PlatformError>;

    async fn activate_campaign(&self, api_key: &str, campaign_id: &str)
        -> Result<(), PlatformError>;

    async fn get_campaign(
        &self,
        api_key: &str,
        campaign_id: &str,
    ) -> Result<CampaignDetails, PlatformError>;
}

#[derive(Clone)]
pub struct InstantlyClient {
    http_client: Client,
    base_url: String,
}

impl InstantlyClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str, api_key: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(api_key)
    }

    /// Manda el request que arma `build`, reintentando rate limits y 5xx con
    /// backoff exponencial.
    async fn send_with_retry<F>(&self, what: &str, build: F) -> Result<String, PlatformError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        let mut delay = INITIAL_BACKOFF_MS;

        loop {
            attempt += 1;

            let result = match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        Ok(body)
                    } else {
                        Err(PlatformError::Http {
                            status: status.as_u16(),
                            body,
                        })
                    }
                }
                Err(e) => Err(PlatformError::Transport(e)),
            };

            match result {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    log::warn!(
                        "(instantly) {} failed (attempt {}/{}), retrying in {}ms: {}",
                        what,
                        attempt,
                        MAX_ATTEMPTS,
                        delay,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay = std::cmp::min(delay * 2, MAX_BACKOFF_MS);
                }
                Err(e) => {
                    log::error!("(instantly) {} failed: {}", what, e);
                    return Err(e);
                }
            }
        }
    }

    async fn send_json<T: DeserializeOwned, F>(&self, what: &str, build: F) -> Result<T, PlatformError>
    where
        F: Fn() -> RequestBuilder,
    {
        let body = self.send_with_retry(what, build).await?;
        serde_json::from_str(&body).map_err(|e| PlatformError::Decode(format!("{}: {}", what, e)))
    }
}

#[async_trait]
impl DeliveryPlatform for InstantlyClient {
    async fn list_accounts(&self, api_key: &str) -> Result<Vec<Account>, PlatformError> {
        let list: AccountList = self
            .send_json("list accounts", || {
                self.request(Method::GET, "/api/v2/accounts", api_key)
                    .query(&[("limit", "100")])
            })
            .await?;
        Ok(list.items)
    }

    async fn create_campaign(
        &self,
        api_key: &str,
        req: &CreateCampaignRequest,
    ) -> Result<CampaignDetails, PlatformError> {
        self.send_json("create campaign", || {
            self.request(Method::POST, "/api/v2/campaigns", api_key)
                .json(req)
        })
        .await
    }

    async fn update_campaign(
        &self,
        api_key: &str,
        campaign_id: &str,
        settings: &CampaignSettings,
    ) -> Result<(), PlatformError> {
        let path = format!("/api/v2/campaigns/{}", urlencoding::encode(campaign_id));
        self.send_with_retry("update campaign", || {
            self.request(Method::PATCH, &path, api_key).json(settings)
        })
        .await?;
        Ok(())
    }

    async fn add_lead(&self, api_key: &str, lead: &AddLeadRequest) -> Result<(), PlatformError> {
        self.send_with_retry("add lead", || {
            self.request(Method::POST, "/api/v2/leads", api_key).json(lead)
        })
        .await?;
        Ok(())
    }

    async fn activate_campaign(
        &self,
        api_key: &str,
        campaign_id: &str,
    ) -> Result<(), PlatformError> {
        let path = format!(
            "/api/v2/campaigns/{}/activate",
            urlencoding::encode(campaign_id)
        );
        self.send_with_retry("activate campaign", || {
            self.request(Method::POST, &path, api_key)
        })
        .await?;
        Ok(())
    }

    async fn get_campaign(
        &self,
        api_key: &str,
        campaign_id: &str,
    ) -> Result<CampaignDetails, PlatformError> {
        let path = format!("/api/v2/campaigns/{}", urlencoding::encode(campaign_id));
        self.send_json("get campaign", || self.request(Method::GET, &path, api_key))
            .await
    }
}
