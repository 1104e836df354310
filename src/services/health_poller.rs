//! services/health_poller.rs
//! Revisa las campañas activas buscando el flag "not sending" de Instantly y
//! propaga el error a costos, runs y un aviso al operador.

use anyhow::Result;
use futures::FutureExt;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use crate::{
    models::{
        campaign_model::{CampaignRecord, CampaignStatus, CheckStatusResponse, DetectedError},
        cost_model::CostStatus,
        ledger_model::RunStatus,
    },
    services::{
        campaign_store::CampaignStore,
        cost_lifecycle::CostLifecycle,
        instantly_client::DeliveryPlatform,
        key_service::SecretResolver,
        notifier::{Notification, Notifier},
        runs_client::Ledger,
        side_effects::{self, SideEffect},
    },
};

#[derive(Debug, PartialEq)]
pub enum CascadeOutcome {
    Cascaded {
        cancelled_costs: usize,
        failed_optional: usize,
    },
    /// La campaña ya estaba en `error`; no se tocó nada.
    AlreadyInError,
}

#[derive(Clone)]
pub struct HealthPoller {
    store: CampaignStore,
    platform: Arc<dyn DeliveryPlatform>,
    secrets: Arc<dyn SecretResolver>,
    ledger: Arc<dyn Ledger>,
    lifecycle: CostLifecycle,
    notifier: Arc<dyn Notifier>,
    query_delay: Duration,
}

impl HealthPoller {
    pub fn new(
        store: CampaignStore,
        platform: Arc<dyn DeliveryPlatform>,
        secrets: Arc<dyn SecretResolver>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        query_delay: Duration,
    ) -> Self {
        let lifecycle = CostLifecycle::new(store.clone(), ledger.clone());
        Self {
            store,
            platform,
            secrets,
            ledger,
            lifecycle,
            notifier,
            query_delay,
        }
    }

    /// Revisa una vez cada campaña activa. Si falla la consulta de una, se
    /// loguea y se salta; si falla una cascada se corta la pasada.
    pub async fn check_all(&self) -> Result<CheckStatusResponse> {
        let campaigns = self.store.list_by_status(CampaignStatus::Active).await?;
        log::info!("(check_all) checking {} active campaigns", campaigns.len());

        let mut response = CheckStatusResponse::default();

        for (i, campaign) in campaigns.iter().enumerate() {
            if i > 0 && !self.query_delay.is_zero() {
                tokio::time::sleep(self.query_delay).await;
            }

            let issue = match self.query_health(campaign).await {
                Ok(issue) => issue,
                Err(e) => {
                    log::error!(
                        "(check_all) could not check Instantly campaign {}: {:#}",
                        campaign.instantly_campaign_id,
                        e
                    );
                    continue;
                }
            };
            response.checked += 1;

            let Some(reason) = issue else {
                continue;
            };

            if let CascadeOutcome::Cascaded { .. } =
                self.handle_campaign_error(campaign, &reason).await?
            {
                response.errors.push(DetectedError {
                    instantly_campaign_id: campaign.instantly_campaign_id.clone(),
                    campaign_id: campaign.campaign_id.clone(),
                    lead_email: campaign.lead_email.clone(),
                    reason,
                });
            }
        }

        log::info!(
            "(check_all) checked {} campaigns, {} newly in error",
            response.checked,
            response.errors.len()
        );
        Ok(response)
    }

    async fn query_health(&self, campaign: &CampaignRecord) -> Result<Option<String>> {
        let api_key = self.secrets.instantly_key(campaign.org_id.as_deref()).await?;
        let details = self
            .platform
            .get_campaign(&api_key, &campaign.instantly_campaign_id)
            .await?;
        Ok(details.health_issue())
    }

    /// Pasa la campaña a `error`, cancela sus costos pendientes, falla el run
    /// padre y avisa al operador. Solo el update del run padre puede tumbar
    /// toda la cascada.
    pub async fn handle_campaign_error(
        &self,
        campaign: &CampaignRecord,
        reason: &str,
    ) -> Result<CascadeOutcome> {
        if campaign.status == CampaignStatus::Error {
            return Ok(CascadeOutcome::AlreadyInError);
        }
        if !self.store.mark_error(&campaign.id, reason).await? {
            log::info!(
                "(campaign_error) {} already in error, skipping",
                campaign.instantly_campaign_id
            );
            return Ok(CascadeOutcome::AlreadyInError);
        }
        log::warn!(
            "(campaign_error) campaign={} lead={} instantly={} -> error: {}",
            campaign.campaign_id,
            campaign.lead_email,
            campaign.instantly_campaign_id,
            reason
        );

        let costs = self
            .store
            .list_costs_with_status(
                &campaign.campaign_id,
                &campaign.lead_email,
                &[CostStatus::Provisioned, CostStatus::Actual],
            )
            .await?;

        let notification = Notification::campaign_error(
            &campaign.name,
            &campaign.instantly_campaign_id,
            &campaign.campaign_id,
            &campaign.lead_email,
            reason,
        );

        let mut effects = Vec::with_capacity(costs.len() + 2);
        for cost in &costs {
            effects.push(SideEffect::optional(
                format!("cancel cost {} (step {})", cost.cost_id, cost.step),
                self.lifecycle
                    .cancel(cost, reason)
                    .map(|r| r.map(|_| ()))
                    .boxed(),
            ));
        }
        match campaign.run_id.as_deref() {
            Some(run_id) => effects.push(SideEffect::required(
                format!("fail parent run {}", run_id),
                self.ledger.update_run(run_id, RunStatus::Failed, Some(reason)),
            )),
            None => log::warn!(
                "(campaign_error) campaign {} has no parent run to fail",
                campaign.instantly_campaign_id
            ),
        }
        effects.push(SideEffect::optional(
            "notify operator",
            self.notifier.notify(&notification),
        ));

        let report = side_effects::execute(effects).await?;

        let cancel_failures = report
            .failed_optional
            .iter()
            .filter(|(op, _)| op.starts_with("cancel cost"))
            .count();
        Ok(CascadeOutcome::Cascaded {
            cancelled_costs: costs.len() - cancel_failures,
            failed_optional: report.failed_optional.len(),
        })
    }
}

/// Corre `check_all` cada `every` hasta que se apague el runtime.
pub fn spawn_periodic(poller: HealthPoller, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // El primer tick sale de inmediato; dejamos que el server arranque tranquilo.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = poller.check_all().await {
                log::error!("(health_poller) periodic check failed: {:#}", e);
            }
        }
    })
}
