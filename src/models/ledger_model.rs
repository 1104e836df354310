//! models/ledger_model.rs
//! Payloads del servicio de runs (runs y sus costos).

use serde::{Deserialize, Serialize};

use crate::models::cost_model::CostStatus;

pub const SERVICE_NAME: &str = "instantly-service";
pub const EMAIL_SEND_COST: &str = "instantly-email-send";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ongoing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub parent_run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub brand_id: String,
    pub app_id: String,
    pub service_name: String,
    pub task_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunCreated {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateRunRequest {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostItem {
    pub cost_name: String,
    pub quantity: u32,
    pub status: CostStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddCostsRequest {
    pub items: Vec<CostItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostCreated {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCostsResponse {
    pub costs: Vec<CostCreated>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateCostRequest {
    pub status: CostStatus,
}
