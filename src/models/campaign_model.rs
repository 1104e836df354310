use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Ciclo de vida de una sub-campaña de nuestro lado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Completed,
    Error,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Error => "error",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "error" => Ok(CampaignStatus::Error),
            other => Err(anyhow!("Unknown campaign status '{}'", other)),
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progreso de entrega del único lead de la sub-campaña.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Replied,
    Bounced,
    Unsubscribed,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Replied => "replied",
            DeliveryStatus::Bounced => "bounced",
            DeliveryStatus::Unsubscribed => "unsubscribed",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "replied" => Ok(DeliveryStatus::Replied),
            "bounced" => Ok(DeliveryStatus::Bounced),
            "unsubscribed" => Ok(DeliveryStatus::Unsubscribed),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(anyhow!("Unknown delivery status '{}'", other)),
        }
    }
}

/// Una campaña de Instantly para exactamente un lead de una campaña lógica.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignRecord {
    pub id: String,
    /// Id de campaña lógica que manda el caller.
    pub campaign_id: String,
    pub lead_email: String,
    pub instantly_campaign_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub delivery_status: DeliveryStatus,
    pub org_id: Option<String>,
    /// Run padre de todo el envío.
    pub run_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Datos para insertar una sub-campaña recién activada.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub campaign_id: String,
    pub lead_email: String,
    pub instantly_campaign_id: String,
    pub name: String,
    pub org_id: Option<String>,
    pub run_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub campaign_id: String,
    pub instantly_campaign_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub variables: Option<serde_json::Value>,
}

/// Campaña que el chequeo pasó a `error` en esta pasada.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedError {
    pub instantly_campaign_id: String,
    pub campaign_id: String,
    pub lead_email: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckStatusResponse {
    pub checked: usize,
    pub errors: Vec<DetectedError>,
}
