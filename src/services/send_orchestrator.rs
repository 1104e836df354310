//! services/send_orchestrator.rs
//! Crea (como mucho) una campaña de Instantly por (campaña lógica, lead),
//! rotando la cuenta remitente si Instantly dice que la campaña no envía,
//! y factura un run por paso cuando la campaña ya está sana.

use anyhow::{anyhow, Context, Result};
use dashmap::DashMap;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::timeout};

use crate::{
    errors::AppError,
    models::{
        campaign_model::{CampaignRecord, CampaignStatus, NewCampaign, NewLead},
        cost_model::CostStatus,
        instantly_model::{
            Account, AddLeadRequest, CampaignSchedule, CampaignSettings, CreateCampaignRequest,
            Sequence, Step, Variant,
        },
        ledger_model::{CreateRunRequest, RunStatus, SERVICE_NAME},
        send_model::{SendRequest, SendResponse, SequenceStep, StepRun},
    },
    services::{
        account_picker::{pick_account, random_seeds, SeedSource},
        campaign_store::{CampaignStore, InsertOutcome},
        cost_lifecycle::CostLifecycle,
        instantly_client::DeliveryPlatform,
        key_service::SecretResolver,
        runs_client::Ledger,
        signature::apply_signature,
    },
};

/// Intentos de creación antes de rendirnos con un lead.
pub const MAX_RETRIES: usize = 3;

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Campaña de Instantly que pasó el chequeo después de activarla.
#[derive(Debug)]
struct ActivatedCampaign {
    instantly_campaign_id: String,
    name: String,
    sender: String,
}

#[derive(Clone)]
pub struct SendOrchestrator {
    store: CampaignStore,
    platform: Arc<dyn DeliveryPlatform>,
    secrets: Arc<dyn SecretResolver>,
    ledger: Arc<dyn Ledger>,
    lifecycle: CostLifecycle,
    seeds: SeedSource,
    attempt_timeout: Duration,
    /// Serializa los envíos del mismo (campaña, lead) dentro de este proceso.
    in_flight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SendOrchestrator {
    pub fn new(
        store: CampaignStore,
        platform: Arc<dyn DeliveryPlatform>,
        secrets: Arc<dyn SecretResolver>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let lifecycle = CostLifecycle::new(store.clone(), ledger.clone());
        Self {
            store,
            platform,
            secrets,
            ledger,
            lifecycle,
            seeds: random_seeds(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn with_seed_source(mut self, seeds: SeedSource) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub async fn send(&self, req: SendRequest) -> Result<SendResponse, AppError> {
        req.validate().map_err(AppError::Validation)?;

        let lead_email = req.lead_email();
        let key = format!("{}\u{1f}{}", req.campaign_id, lead_email);

        let lock = self.in_flight.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.send_locked(&req, &lead_email).await
        };
        drop(lock);
        self.in_flight
            .remove_if(&key, |_, l| Arc::strong_count(l) == 1);

        result
    }

    async fn send_locked(&self, req: &SendRequest, lead_email: &str) -> Result<SendResponse, AppError> {
        // 1) Ya se le envió a este lead: devolvemos el resultado anterior.
        if let Some(existing) = self.store.find_campaign(&req.campaign_id, lead_email).await? {
            log::info!(
                "(send) campaign={} lead={} already has Instantly campaign {}, skipping",
                req.campaign_id,
                lead_email,
                existing.instantly_campaign_id
            );
            return Ok(self.prior_outcome(&existing).await?);
        }

        let api_key = self.secrets.instantly_key(req.org_id.as_deref()).await?;

        // 2) Pool de remitentes
        let accounts = self
            .platform
            .list_accounts(&api_key)
            .await
            .map_err(|e| anyhow!(e).context("Listing Instantly accounts"))?;
        if accounts.is_empty() {
            log::error!("(send) campaign={} no sending accounts", req.campaign_id);
            return Err(AppError::NoAccounts);
        }

        // 3) Crear + activar, rotando remitente si la campaña no está sana
        let steps = req.ordered_sequence();
        let mut last_error = String::new();
        let mut activated = None;

        for attempt in 1..=MAX_RETRIES {
            let seed = (self.seeds)();
            let account = pick_account(&accounts, seed).ok_or(AppError::NoAccounts)?;

            let outcome = timeout(
                self.attempt_timeout,
                self.create_and_activate(&api_key, req, lead_email, &steps, account),
            )
            .await;

            match outcome {
                Ok(Ok(campaign)) => {
                    log::info!(
                        "(send) attempt {}/{} campaign={} lead={} -> Instantly campaign {} via {}",
                        attempt,
                        MAX_RETRIES,
                        req.campaign_id,
                        lead_email,
                        campaign.instantly_campaign_id,
                        campaign.sender
                    );
                    activated = Some(campaign);
                    break;
                }
                Ok(Err(e)) => {
                    last_error = format!("{:#}", e);
                }
                Err(_) => {
                    last_error = format!("attempt timed out after {:?}", self.attempt_timeout);
                }
            }
            log::warn!(
                "(send) attempt {}/{} campaign={} lead={} account={} failed: {}",
                attempt,
                MAX_RETRIES,
                req.campaign_id,
                lead_email,
                account.email,
                last_error
            );
        }

        // 4) Todavía no guardamos nada, no hay que limpiar.
        let Some(activated) = activated else {
            log::error!(
                "(send) campaign={} lead={} gave up after {} attempts",
                req.campaign_id,
                lead_email,
                MAX_RETRIES
            );
            return Err(AppError::RetriesExhausted {
                attempts: MAX_RETRIES,
                last_error,
            });
        };

        // 5) Guardar
        let new_campaign = NewCampaign {
            campaign_id: req.campaign_id.clone(),
            lead_email: lead_email.to_string(),
            instantly_campaign_id: activated.instantly_campaign_id.clone(),
            name: activated.name.clone(),
            org_id: req.org_id.clone(),
            run_id: Some(req.run_id.clone()),
            metadata: Some(json!({
                "senderAccount": activated.sender,
                "brandId": req.brand_id,
                "appId": req.app_id,
            })),
        };

        let record = match self.store.insert_campaign(&new_campaign).await? {
            InsertOutcome::Inserted(record) => record,
            InsertOutcome::Duplicate => {
                // Otro proceso ganó la carrera; nos quedamos con su campaña.
                log::warn!(
                    "(send) campaign={} lead={} recorded concurrently, Instantly campaign {} is orphaned",
                    req.campaign_id,
                    lead_email,
                    activated.instantly_campaign_id
                );
                let existing = self
                    .store
                    .find_campaign(&req.campaign_id, lead_email)
                    .await?
                    .context("Duplicate campaign not found after conflict")?;
                return Ok(self.prior_outcome(&existing).await?);
            }
        };

        let lead_id = self
            .store
            .insert_lead(&NewLead {
                campaign_id: req.campaign_id.clone(),
                instantly_campaign_id: record.instantly_campaign_id.clone(),
                email: lead_email.to_string(),
                first_name: req.first_name.clone(),
                last_name: req.last_name.clone(),
                company: req.company.clone(),
                variables: req.variables.clone().map(serde_json::Value::Object),
            })
            .await?;

        // 6) Facturación
        let step_runs = self.bill_steps(req, &record, &steps).await?;

        Ok(SendResponse {
            success: true,
            campaign_id: req.campaign_id.clone(),
            lead_id: Some(lead_id),
            added: 1,
            step_runs,
        })
    }

    async fn create_and_activate(
        &self,
        api_key: &str,
        req: &SendRequest,
        lead_email: &str,
        steps: &[SequenceStep],
        account: &Account,
    ) -> Result<ActivatedCampaign> {
        let name = format!("{} - {}", req.campaign_id, lead_email);
        let create = CreateCampaignRequest {
            name: name.clone(),
            campaign_schedule: CampaignSchedule::default(),
            sequences: vec![Sequence {
                steps: build_steps(&req.subject, steps, account.signature.as_deref()),
            }],
        };

        let created = self
            .platform
            .create_campaign(api_key, &create)
            .await
            .context("create campaign")?;
        let id = created.id;

        self.platform
            .update_campaign(api_key, &id, &CampaignSettings::for_sender(&account.email))
            .await
            .with_context(|| format!("assign sender to {}", id))?;

        self.platform
            .add_lead(
                api_key,
                &AddLeadRequest {
                    campaign: id.clone(),
                    email: lead_email.to_string(),
                    first_name: req.first_name.clone(),
                    last_name: req.last_name.clone(),
                    company_name: req.company.clone(),
                    custom_variables: req.variables.clone(),
                },
            )
            .await
            .with_context(|| format!("add lead to {}", id))?;

        self.platform
            .activate_campaign(api_key, &id)
            .await
            .with_context(|| format!("activate {}", id))?;

        let details = self
            .platform
            .get_campaign(api_key, &id)
            .await
            .with_context(|| format!("fetch {} after activation", id))?;

        if let Some(issue) = details.health_issue() {
            return Err(anyhow!("Instantly campaign {} is not sending ({})", id, issue));
        }

        Ok(ActivatedCampaign {
            instantly_campaign_id: id,
            name,
            sender: account.email.clone(),
        })
    }

    /// Un run + un costo por paso. El primero se cobra de una; el resto
    /// queda provisioned hasta que Instantly avise que se enviaron.
    async fn bill_steps(
        &self,
        req: &SendRequest,
        record: &CampaignRecord,
        steps: &[SequenceStep],
    ) -> Result<Vec<StepRun>, AppError> {
        let lead_email = record.lead_email.as_str();
        let mut created_runs: Vec<String> = Vec::new();
        let mut step_runs = Vec::with_capacity(steps.len());

        for (idx, step) in steps.iter().enumerate() {
            let charged_now = idx == 0;
            let billed = self
                .bill_step(req, lead_email, step, charged_now, &mut created_runs)
                .await;
            match billed {
                Ok(run_id) => step_runs.push(StepRun {
                    step: step.step,
                    run_id,
                }),
                Err(e) => {
                    let reason = format!("Billing step {} failed: {:#}", step.step, e);
                    log::error!(
                        "(bill_steps) campaign={} lead={} {}",
                        req.campaign_id,
                        lead_email,
                        reason
                    );
                    self.rollback_billing(record, &created_runs, &reason).await;
                    return Err(AppError::Internal(e));
                }
            }
        }

        Ok(step_runs)
    }

    async fn bill_step(
        &self,
        req: &SendRequest,
        lead_email: &str,
        step: &SequenceStep,
        charged_now: bool,
        created_runs: &mut Vec<String>,
    ) -> Result<String> {
        let run_id = self
            .ledger
            .create_run(&CreateRunRequest {
                parent_run_id: req.run_id.clone(),
                organization_id: req.org_id.clone(),
                brand_id: req.brand_id.clone(),
                app_id: req.app_id.clone(),
                service_name: SERVICE_NAME.to_string(),
                task_name: format!("email-step-{}", step.step),
            })
            .await
            .with_context(|| format!("create run for step {}", step.step))?;
        created_runs.push(run_id.clone());

        let status = if charged_now {
            CostStatus::Actual
        } else {
            CostStatus::Provisioned
        };
        let cost_id = self
            .ledger
            .add_cost(&run_id, status)
            .await
            .with_context(|| format!("add cost to run {}", run_id))?;

        if charged_now {
            self.ledger
                .update_run(&run_id, RunStatus::Completed, None)
                .await
                .with_context(|| format!("complete run {}", run_id))?;
        }

        if let Err(e) = self
            .store
            .insert_cost(&req.campaign_id, lead_email, step.step, &run_id, &cost_id, status)
            .await
        {
            // Sin fila local nadie cancelaría este costo después.
            if let Err(cancel_err) = self
                .ledger
                .update_cost(&run_id, &cost_id, CostStatus::Cancelled)
                .await
            {
                log::error!(
                    "(bill_step) cost {} left open in the ledger: {:#}",
                    cost_id,
                    cancel_err
                );
            }
            return Err(e);
        }

        log::info!(
            "(bill_step) campaign={} lead={} step={} run={} cost={} ({})",
            req.campaign_id,
            lead_email,
            step.step,
            run_id,
            cost_id,
            status.as_str()
        );
        Ok(run_id)
    }

    /// Deshace una facturación a medias: cancela los costos ya creados (y
    /// falla sus runs), falla los runs que se quedaron sin costo y deja la
    /// campaña en `error` para que un reenvío no la reporte como exitosa.
    async fn rollback_billing(&self, record: &CampaignRecord, created_runs: &[String], reason: &str) {
        let costs = match self
            .store
            .list_costs(&record.campaign_id, &record.lead_email)
            .await
        {
            Ok(costs) => costs,
            Err(e) => {
                log::error!(
                    "(rollback_billing) could not load costs for campaign={} lead={}: {:#}",
                    record.campaign_id,
                    record.lead_email,
                    e
                );
                Vec::new()
            }
        };

        for cost in &costs {
            if let Err(e) = self.lifecycle.cancel(cost, reason).await {
                log::error!(
                    "(rollback_billing) could not cancel cost {} (step {}): {:#}",
                    cost.cost_id,
                    cost.step,
                    e
                );
            }
        }

        let without_cost: Vec<String> = created_runs
            .iter()
            .filter(|run_id| !costs.iter().any(|c| &c.run_id == *run_id))
            .cloned()
            .collect();
        self.fail_runs(&without_cost, reason).await;

        if let Err(e) = self.store.mark_error(&record.id, reason).await {
            log::error!(
                "(rollback_billing) could not mark campaign {} as error: {:#}",
                record.instantly_campaign_id,
                e
            );
        }
    }

    async fn fail_runs(&self, run_ids: &[String], reason: &str) {
        for run_id in run_ids {
            if let Err(e) = self
                .ledger
                .update_run(run_id, RunStatus::Failed, Some(reason))
                .await
            {
                log::warn!("(fail_runs) could not fail run {}: {:#}", run_id, e);
            }
        }
    }

    async fn prior_outcome(&self, existing: &CampaignRecord) -> Result<SendResponse> {
        let step_runs = self
            .store
            .list_costs(&existing.campaign_id, &existing.lead_email)
            .await?
            .into_iter()
            .map(|c| StepRun {
                step: c.step,
                run_id: c.run_id,
            })
            .collect();

        // Una campaña en error (p. ej. facturación incompleta) no es un éxito.
        Ok(SendResponse {
            success: existing.status != CampaignStatus::Error,
            campaign_id: existing.campaign_id.clone(),
            lead_id: None,
            added: 0,
            step_runs,
        })
    }
}

/// En Instantly el delay es "días después de este paso", el nuestro es "días
/// desde el paso anterior": cada paso toma el delay del siguiente.
fn build_steps(subject: &str, steps: &[SequenceStep], signature: Option<&str>) -> Vec<Step> {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| Step {
            kind: "email".to_string(),
            delay: steps.get(i + 1).map(|n| n.days_since_last_step).unwrap_or(0),
            variants: vec![Variant {
                subject: subject.to_string(),
                body: apply_signature(&s.body_html, signature),
            }],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_shift_to_previous_step() {
        let steps = vec![
            SequenceStep { step: 1, body_html: "a".into(), days_since_last_step: 0 },
            SequenceStep { step: 2, body_html: "b".into(), days_since_last_step: 3 },
            SequenceStep { step: 3, body_html: "c".into(), days_since_last_step: 5 },
        ];
        let built = build_steps("Hi", &steps, Some("Sig"));
        let delays: Vec<u32> = built.iter().map(|s| s.delay).collect();
        assert_eq!(delays, vec![3, 5, 0]);
        assert_eq!(built[0].variants[0].body, "a<br><br>Sig");
        assert_eq!(built[2].variants[0].subject, "Hi");
    }
}
