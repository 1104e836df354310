//! models/instantly_model.rs
//! Tipos de la API v2 de Instantly.

use serde::{Deserialize, Serialize};

/// Un buzón remitente conectado a Instantly.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountList {
    #[serde(default)]
    pub items: Vec<Account>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: String,
    /// Días a esperar después de este paso antes del siguiente.
    pub delay: u32,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sequence {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Schedule {
    pub name: String,
    pub timing: serde_json::Value,
    pub days: serde_json::Value,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignSchedule {
    pub schedules: Vec<Schedule>,
}

impl Default for CampaignSchedule {
    fn default() -> Self {
        CampaignSchedule {
            schedules: vec![Schedule {
                name: "Default".to_string(),
                timing: serde_json::json!({ "from": "09:00", "to": "17:00" }),
                days: serde_json::json!({
                    "1": true, "2": true, "3": true, "4": true, "5": true
                }),
                timezone: "America/Chicago".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub campaign_schedule: CampaignSchedule,
    pub sequences: Vec<Sequence>,
}

/// Remitente asignado más la política fija de envío.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSettings {
    pub email_list: Vec<String>,
    pub open_tracking: bool,
    pub link_tracking: bool,
    pub insert_unsubscribe_header: bool,
    pub stop_on_reply: bool,
}

impl CampaignSettings {
    pub fn for_sender(email: &str) -> Self {
        CampaignSettings {
            email_list: vec![email.to_string()],
            open_tracking: true,
            link_tracking: true,
            insert_unsubscribe_header: true,
            stop_on_reply: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddLeadRequest {
    pub campaign: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_variables: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CampaignDetails {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    /// Lo pone Instantly cuando la campaña no puede enviar (cuenta mala, DNS, etc.).
    #[serde(default)]
    pub not_sending_status: Option<serde_json::Value>,
}

impl CampaignDetails {
    /// Motivo por el que la campaña no envía, si hay alguno.
    pub fn health_issue(&self) -> Option<String> {
        use serde_json::Value;
        match self.not_sending_status.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::Number(n) if n.as_i64() == Some(0) => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::Array(a) if a.is_empty() => None,
            Value::Object(o) if o.is_empty() => None,
            Value::String(s) => Some(format!("not_sending_status: {}", s)),
            other => Some(format!("not_sending_status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details(flag: serde_json::Value) -> CampaignDetails {
        serde_json::from_value(json!({ "id": "c1", "not_sending_status": flag }))
            .expect("details json")
    }

    #[test]
    fn healthy_flags() {
        for flag in [json!(null), json!(0), json!(""), json!([]), json!(false)] {
            assert_eq!(details(flag.clone()).health_issue(), None, "{}", flag);
        }
        let missing: CampaignDetails =
            serde_json::from_value(json!({ "id": "c1" })).expect("details json");
        assert_eq!(missing.health_issue(), None);
    }

    #[test]
    fn unhealthy_flags() {
        assert!(details(json!(2)).health_issue().is_some());
        assert_eq!(
            details(json!("account_suspended")).health_issue().as_deref(),
            Some("not_sending_status: account_suspended")
        );
    }
}
