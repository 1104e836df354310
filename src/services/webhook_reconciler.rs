//! services/webhook_reconciler.rs
//! Procesa los webhooks de Instantly: log de auditoría, estado de entrega y
//! las transiciones de costos que implican.

use anyhow::Result;

use crate::{
    errors::AppError,
    models::{
        campaign_model::{CampaignRecord, CampaignStatus},
        cost_model::CostStatus,
        webhook_model::{InstantlyWebhookPayload, NewWebhookEvent, WebhookEventType, WebhookResponse},
    },
    services::{campaign_store::CampaignStore, cost_lifecycle::CostLifecycle},
};

#[derive(Clone)]
pub struct WebhookReconciler {
    store: CampaignStore,
    lifecycle: CostLifecycle,
}

impl WebhookReconciler {
    pub fn new(store: CampaignStore, lifecycle: CostLifecycle) -> Self {
        Self { store, lifecycle }
    }

    pub async fn ingest(&self, raw: serde_json::Value) -> Result<WebhookResponse, AppError> {
        let payload: InstantlyWebhookPayload = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {}", e)))?;

        let (Some(event_type), Some(instantly_campaign_id)) = (
            payload.event_type.clone().filter(|s| !s.is_empty()),
            payload.campaign_id.clone().filter(|s| !s.is_empty()),
        ) else {
            return Err(AppError::Validation(
                "campaign_id and event_type are required".to_string(),
            ));
        };

        // El id de campaña hace de credencial: solo aceptamos campañas nuestras.
        let Some(campaign) = self.store.find_by_instantly_id(&instantly_campaign_id).await? else {
            log::warn!(
                "(webhook) rejected {} for unknown Instantly campaign {}",
                event_type,
                instantly_campaign_id
            );
            return Err(AppError::Unauthorized(format!(
                "Unknown campaign {}",
                instantly_campaign_id
            )));
        };

        self.store
            .insert_webhook_event(&NewWebhookEvent {
                event_type: event_type.clone(),
                instantly_campaign_id: instantly_campaign_id.clone(),
                lead_email: payload.lead_email.clone(),
                email_account: payload.email_account.clone(),
                step: payload.step,
                variant: payload.variant,
                event_timestamp: payload.timestamp.clone(),
                payload: raw,
            })
            .await?;

        let kind = WebhookEventType::parse(&event_type);
        log::info!(
            "(webhook) {} campaign={} lead={} step={:?}",
            event_type,
            campaign.campaign_id,
            campaign.lead_email,
            payload.step
        );

        if let Some(lead) = payload.lead_email.as_deref() {
            if !lead.eq_ignore_ascii_case(&campaign.lead_email) {
                log::warn!(
                    "(webhook) event lead {} differs from campaign lead {}",
                    lead,
                    campaign.lead_email
                );
            }
        }

        if let Some(status) = kind.delivery_status() {
            self.store.update_delivery_status(&campaign.id, status).await?;
        }
        if kind == WebhookEventType::CampaignCompleted && campaign.status == CampaignStatus::Active {
            self.store
                .update_status(&campaign.id, CampaignStatus::Completed)
                .await?;
        }

        if let Err(e) = self.apply_cost_effects(&campaign, kind, &event_type, payload.step).await {
            log::error!(
                "(webhook) cost update for {} on campaign={} lead={} failed: {:#}",
                event_type,
                campaign.campaign_id,
                campaign.lead_email,
                e
            );
        }

        Ok(WebhookResponse {
            success: true,
            event_type,
        })
    }

    async fn apply_cost_effects(
        &self,
        campaign: &CampaignRecord,
        kind: WebhookEventType,
        event_type: &str,
        step: Option<i64>,
    ) -> Result<()> {
        match kind {
            // El paso 1 ya se cobró al crear la campaña.
            WebhookEventType::EmailSent => match step {
                Some(step) if step > 1 => self.confirm_step(campaign, step).await,
                _ => Ok(()),
            },
            k if k.stops_sequence() => self.cancel_remaining(campaign, event_type).await,
            _ => Ok(()),
        }
    }

    async fn confirm_step(&self, campaign: &CampaignRecord, step: i64) -> Result<()> {
        let cost = self
            .store
            .find_cost(
                &campaign.campaign_id,
                &campaign.lead_email,
                step,
                CostStatus::Provisioned,
            )
            .await?;

        match cost {
            Some(cost) => {
                self.lifecycle.convert_to_actual(&cost).await?;
            }
            None => log::warn!(
                "(webhook) no provisioned cost for campaign={} lead={} step={}, nothing to convert",
                campaign.campaign_id,
                campaign.lead_email,
                step
            ),
        }
        Ok(())
    }

    async fn cancel_remaining(&self, campaign: &CampaignRecord, reason: &str) -> Result<()> {
        let pending = self
            .store
            .list_costs_with_status(
                &campaign.campaign_id,
                &campaign.lead_email,
                &[CostStatus::Provisioned],
            )
            .await?;

        let mut failures = 0;
        for cost in &pending {
            if let Err(e) = self.lifecycle.cancel(cost, reason).await {
                failures += 1;
                log::error!(
                    "(webhook) cancelling step {} cost {} failed: {:#}",
                    cost.step,
                    cost.cost_id,
                    e
                );
            }
        }

        log::info!(
            "(webhook) {} -> cancelled {}/{} provisioned costs for campaign={} lead={}",
            reason,
            pending.len() - failures,
            pending.len(),
            campaign.campaign_id,
            campaign.lead_email
        );
        Ok(())
    }
}
