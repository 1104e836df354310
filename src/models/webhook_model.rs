//! models/webhook_model.rs
//! Payloads de los webhooks de Instantly y los tipos de evento.

use serde::{Deserialize, Serialize};

use crate::models::campaign_model::DeliveryStatus;

/// Body de `POST /webhooks/instantly`. Los campos desconocidos se guardan en el log crudo.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstantlyWebhookPayload {
    pub event_type: Option<String>,
    pub campaign_id: Option<String>,
    pub lead_email: Option<String>,
    pub email_account: Option<String>,
    pub step: Option<i64>,
    pub variant: Option<i64>,
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventType {
    EmailSent,
    EmailOpened,
    LinkClicked,
    ReplyReceived,
    AutoReplyReceived,
    OutOfOffice,
    EmailBounced,
    LeadUnsubscribed,
    LeadNotInterested,
    CampaignCompleted,
    Other,
}

impl WebhookEventType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "email_sent" => WebhookEventType::EmailSent,
            "email_opened" => WebhookEventType::EmailOpened,
            "email_link_clicked" | "link_clicked" => WebhookEventType::LinkClicked,
            "reply_received" => WebhookEventType::ReplyReceived,
            "auto_reply_received" => WebhookEventType::AutoReplyReceived,
            "lead_out_of_office" => WebhookEventType::OutOfOffice,
            "email_bounced" => WebhookEventType::EmailBounced,
            "lead_unsubscribed" => WebhookEventType::LeadUnsubscribed,
            "lead_not_interested" => WebhookEventType::LeadNotInterested,
            "campaign_completed" => WebhookEventType::CampaignCompleted,
            _ => WebhookEventType::Other,
        }
    }

    /// Estado de entrega al que pasa el lead, si el evento dice algo al respecto.
    pub fn delivery_status(&self) -> Option<DeliveryStatus> {
        match self {
            WebhookEventType::EmailSent => Some(DeliveryStatus::Sent),
            WebhookEventType::EmailOpened
            | WebhookEventType::LinkClicked
            | WebhookEventType::AutoReplyReceived
            | WebhookEventType::OutOfOffice => Some(DeliveryStatus::Delivered),
            WebhookEventType::ReplyReceived | WebhookEventType::LeadNotInterested => {
                Some(DeliveryStatus::Replied)
            }
            WebhookEventType::EmailBounced => Some(DeliveryStatus::Bounced),
            WebhookEventType::LeadUnsubscribed => Some(DeliveryStatus::Unsubscribed),
            WebhookEventType::CampaignCompleted | WebhookEventType::Other => None,
        }
    }

    /// Eventos después de los cuales Instantly ya no le manda más pasos al lead.
    pub fn stops_sequence(&self) -> bool {
        matches!(
            self,
            WebhookEventType::ReplyReceived
                | WebhookEventType::EmailBounced
                | WebhookEventType::LeadUnsubscribed
                | WebhookEventType::LeadNotInterested
        )
    }
}

/// Fila de auditoría (solo se agrega).
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_type: String,
    pub instantly_campaign_id: String,
    pub lead_email: Option<String>,
    pub email_account: Option<String>,
    pub step: Option<i64>,
    pub variant: Option<i64>,
    pub event_timestamp: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(rename = "eventType")]
    pub event_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_reply_does_not_stop_sequence() {
        let t = WebhookEventType::parse("auto_reply_received");
        assert!(!t.stops_sequence());
        assert_eq!(t.delivery_status(), Some(DeliveryStatus::Delivered));
    }

    #[test]
    fn stop_set() {
        for raw in [
            "reply_received",
            "email_bounced",
            "lead_unsubscribed",
            "lead_not_interested",
        ] {
            assert!(WebhookEventType::parse(raw).stops_sequence(), "{}", raw);
        }
        for raw in ["email_sent", "email_opened", "link_clicked", "lead_out_of_office"] {
            assert!(!WebhookEventType::parse(raw).stops_sequence(), "{}", raw);
        }
    }

    #[test]
    fn unknown_events_have_no_status() {
        assert_eq!(WebhookEventType::parse("something_new"), WebhookEventType::Other);
        assert_eq!(WebhookEventType::Other.delivery_status(), None);
    }
}
