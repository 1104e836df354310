use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Copia local del estado de un costo del ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostStatus {
    Provisioned,
    Actual,
    Cancelled,
}

impl CostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostStatus::Provisioned => "provisioned",
            CostStatus::Actual => "actual",
            CostStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for CostStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisioned" => Ok(CostStatus::Provisioned),
            "actual" => Ok(CostStatus::Actual),
            "cancelled" => Ok(CostStatus::Cancelled),
            other => Err(anyhow!("Unknown cost status '{}'", other)),
        }
    }
}

/// Cobro de un paso de la secuencia de un lead.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceCostRecord {
    pub id: String,
    pub campaign_id: String,
    pub lead_email: String,
    /// Empieza en 1.
    pub step: i64,
    pub run_id: String,
    pub cost_id: String,
    pub status: CostStatus,
}
