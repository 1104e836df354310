//! services/cost_lifecycle.rs
//! Transiciones de los costos de la secuencia y de sus runs asociados.
//!
//! provisioned -> actual      (paso enviado confirmado; run completed)
//! provisioned -> cancelled   (secuencia detenida; run failed)
//! actual      -> cancelled   (campaña en error; se tolera que el run no falle)
//!
//! Primero se actualiza el ledger y luego la fila local, y la fila local solo
//! se mueve si sigue en el estado esperado: repetir una transición no hace
//! nada.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::{
    models::{
        cost_model::{CostStatus, SequenceCostRecord},
        ledger_model::RunStatus,
    },
    services::{campaign_store::CampaignStore, runs_client::Ledger},
};

#[derive(Clone)]
pub struct CostLifecycle {
    store: CampaignStore,
    ledger: Arc<dyn Ledger>,
}

impl CostLifecycle {
    pub fn new(store: CampaignStore, ledger: Arc<dyn Ledger>) -> Self {
        Self { store, ledger }
    }

    /// Confirma un paso provisionado. Devuelve si la fila local se movió.
    pub async fn convert_to_actual(&self, cost: &SequenceCostRecord) -> Result<bool> {
        if cost.status != CostStatus::Provisioned {
            log::warn!(
                "(convert_to_actual) cost {} for step {} is {}, nothing to convert",
                cost.cost_id,
                cost.step,
                cost.status.as_str()
            );
            return Ok(false);
        }

        self.ledger
            .update_cost(&cost.run_id, &cost.cost_id, CostStatus::Actual)
            .await
            .with_context(|| format!("Marking cost {} actual", cost.cost_id))?;
        self.ledger
            .update_run(&cost.run_id, RunStatus::Completed, None)
            .await
            .with_context(|| format!("Completing run {}", cost.run_id))?;

        let moved = self
            .store
            .transition_cost(&cost.id, CostStatus::Provisioned, CostStatus::Actual)
            .await?;

        log::info!(
            "(convert_to_actual) campaign={} lead={} step={} run={} cost={} -> actual",
            cost.campaign_id,
            cost.lead_email,
            cost.step,
            cost.run_id,
            cost.cost_id
        );
        Ok(moved)
    }

    /// Cancela un costo provisioned o actual y falla su run con `reason`.
    /// Si el costo ya era actual, el ledger puede negarse a fallar el run
    /// (ya está completed); lo logueamos y seguimos.
    pub async fn cancel(&self, cost: &SequenceCostRecord, reason: &str) -> Result<bool> {
        if cost.status == CostStatus::Cancelled {
            return Ok(false);
        }

        self.ledger
            .update_cost(&cost.run_id, &cost.cost_id, CostStatus::Cancelled)
            .await
            .with_context(|| format!("Cancelling cost {}", cost.cost_id))?;

        if let Err(e) = self
            .ledger
            .update_run(&cost.run_id, RunStatus::Failed, Some(reason))
            .await
        {
            if cost.status == CostStatus::Actual {
                log::warn!(
                    "(cancel_cost) run {} (step {}) already completed, could not fail it: {:#}",
                    cost.run_id,
                    cost.step,
                    e
                );
            } else {
                return Err(e).with_context(|| format!("Failing run {}", cost.run_id));
            }
        }

        let moved = self
            .store
            .transition_cost(&cost.id, cost.status, CostStatus::Cancelled)
            .await?;

        log::info!(
            "(cancel_cost) campaign={} lead={} step={} cost={} {} -> cancelled ({})",
            cost.campaign_id,
            cost.lead_email,
            cost.step,
            cost.cost_id,
            cost.status.as_str(),
            reason
        );
        Ok(moved)
    }
}
