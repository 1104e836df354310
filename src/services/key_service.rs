//! services/key_service.rs
//! Decide qué API key de Instantly usar: la de la organización (BYOK) si
//! viene orgId, y la compartida si no.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::errors::CredentialError;

#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn instantly_key(&self, org_id: Option<&str>) -> Result<String, CredentialError>;
}

#[derive(Debug, Deserialize)]
struct DecryptedKey {
    key: String,
}

#[derive(Clone)]
pub struct KeyServiceClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    shared_key: Option<String>,
}

impl KeyServiceClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        shared_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            shared_key,
        })
    }

    async fn fetch_org_key(&self, org_id: &str) -> Result<String, CredentialError> {
        let url = format!("{}/internal/keys/instantly/decrypt", self.base_url);
        let resp = self
            .http_client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(&[("orgId", org_id)])
            .send()
            .await
            .context("GET key service")
            .map_err(CredentialError::Unavailable)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(CredentialError::NotConfigured(org_id.to_string())),
            s if s.is_success() => {
                let body: DecryptedKey = resp
                    .json()
                    .await
                    .context("Decoding key service response")
                    .map_err(CredentialError::Unavailable)?;
                Ok(body.key)
            }
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(CredentialError::Unavailable(anyhow!(
                    "key service returned {}: {}",
                    s,
                    body
                )))
            }
        }
    }
}

#[async_trait]
impl SecretResolver for KeyServiceClient {
    async fn instantly_key(&self, org_id: Option<&str>) -> Result<String, CredentialError> {
        match org_id {
            Some(org) => self.fetch_org_key(org).await,
            None => self
                .shared_key
                .clone()
                .ok_or_else(|| CredentialError::NotConfigured("shared".to_string())),
        }
    }
}
