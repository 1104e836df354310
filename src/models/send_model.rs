//! models/send_model.rs
//! Request/response de `POST /send`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStep {
    pub step: i64,
    pub body_html: String,
    #[serde(default)]
    pub days_since_last_step: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub org_id: Option<String>,
    pub brand_id: String,
    pub app_id: String,
    /// Run padre del caller; los runs de cada paso cuelgan de este.
    pub run_id: String,
    pub campaign_id: String,
    pub lead_id: Option<String>,
    pub to: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub variables: Option<serde_json::Map<String, serde_json::Value>>,
    pub subject: String,
    pub sequence: Vec<SequenceStep>,
}

impl SendRequest {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("brandId", &self.brand_id),
            ("appId", &self.app_id),
            ("runId", &self.run_id),
            ("campaignId", &self.campaign_id),
            ("subject", &self.subject),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", field));
            }
        }

        let to = self.to.trim();
        match to.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(format!("'{}' is not a valid email address", self.to)),
        }

        if self.sequence.is_empty() {
            return Err("sequence must contain at least one step".to_string());
        }

        let mut seen = HashSet::new();
        for s in &self.sequence {
            if s.step < 1 {
                return Err(format!("step numbers start at 1, got {}", s.step));
            }
            if !seen.insert(s.step) {
                return Err(format!("step {} appears more than once", s.step));
            }
        }

        // Instantly numera los pasos por posición (1..N); con huecos los
        // eventos email_sent no encontrarían su costo.
        let mut numbers: Vec<i64> = seen.into_iter().collect();
        numbers.sort_unstable();
        if let Some((pos, n)) = numbers
            .iter()
            .enumerate()
            .find(|(pos, n)| **n != *pos as i64 + 1)
        {
            return Err(format!(
                "steps must be numbered 1..{} without gaps, found step {} at position {}",
                numbers.len(),
                n,
                pos + 1
            ));
        }

        Ok(())
    }

    /// Pasos en orden de envío.
    pub fn ordered_sequence(&self) -> Vec<SequenceStep> {
        let mut steps = self.sequence.clone();
        steps.sort_by_key(|s| s.step);
        steps
    }

    /// Email tal como se usa para dedup y para guardar.
    pub fn lead_email(&self) -> String {
        self.to.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRun {
    pub step: i64,
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    pub added: u32,
    pub step_runs: Vec<StepRun>,
}
