//! services/runs_client.rs
//! Cliente del servicio de runs (dueño de los runs y sus costos).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use std::time::Duration;

use crate::models::{
    cost_model::CostStatus,
    ledger_model::{
        AddCostsRequest, AddCostsResponse, CostItem, CreateRunRequest, RunCreated, RunStatus,
        UpdateCostRequest, UpdateRunRequest, EMAIL_SEND_COST,
    },
};

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn create_run(&self, req: &CreateRunRequest) -> Result<String>;

    async fn update_run(&self, run_id: &str, status: RunStatus, error: Option<&str>) -> Result<()>;

    /// Agrega un costo de envío al run y devuelve el id del costo.
    async fn add_cost(&self, run_id: &str, status: CostStatus) -> Result<String>;

    async fn update_cost(&self, run_id: &str, cost_id: &str, status: CostStatus) -> Result<()>;
}

#[derive(Clone)]
pub struct RunsClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl RunsClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request<B: Serialize>(&self, method: Method, path: &str, body: &B) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-API-Key", &self.api_key)
            .json(body)
    }

    async fn execute(&self, what: &str, req: RequestBuilder) -> Result<String> {
        let resp = req.send().await.with_context(|| format!("runs service: {}", what))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("runs service {} returned {}: {}", what, status, body));
        }
        Ok(body)
    }
}

#[async_trait]
impl Ledger for RunsClient {
    async fn create_run(&self, req: &CreateRunRequest) -> Result<String> {
        let body = self
            .execute("create run", self.request(Method::POST, "/v1/runs", req))
            .await?;
        let run: RunCreated = serde_json::from_str(&body).context("Decoding created run")?;
        Ok(run.id)
    }

    async fn update_run(&self, run_id: &str, status: RunStatus, error: Option<&str>) -> Result<()> {
        let path = format!("/v1/runs/{}", urlencoding::encode(run_id));
        let payload = UpdateRunRequest {
            status,
            error: error.map(str::to_string),
        };
        self.execute("update run", self.request(Method::PATCH, &path, &payload))
            .await?;
        Ok(())
    }

    async fn add_cost(&self, run_id: &str, status: CostStatus) -> Result<String> {
        let path = format!("/v1/runs/{}/costs", urlencoding::encode(run_id));
        let payload = AddCostsRequest {
            items: vec![CostItem {
                cost_name: EMAIL_SEND_COST.to_string(),
                quantity: 1,
                status,
            }],
        };
        let body = self
            .execute("add cost", self.request(Method::POST, &path, &payload))
            .await?;
        let created: AddCostsResponse = serde_json::from_str(&body).context("Decoding costs")?;
        created
            .costs
            .into_iter()
            .next()
            .map(|c| c.id)
            .ok_or_else(|| anyhow!("runs service returned no cost for run {}", run_id))
    }

    async fn update_cost(&self, run_id: &str, cost_id: &str, status: CostStatus) -> Result<()> {
        let path = format!(
            "/v1/runs/{}/costs/{}",
            urlencoding::encode(run_id),
            urlencoding::encode(cost_id)
        );
        self.execute(
            "update cost",
            self.request(Method::PATCH, &path, &UpdateCostRequest { status }),
        )
        .await?;
        Ok(())
    }
}
