//! services/campaign_store.rs
//! Persistencia en SQLite de sub-campañas, leads, costos y eventos de webhook.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use uuid::Uuid;

use crate::models::{
    campaign_model::{CampaignRecord, CampaignStatus, DeliveryStatus, NewCampaign, NewLead},
    cost_model::{CostStatus, SequenceCostRecord},
    webhook_model::NewWebhookEvent,
};

const CAMPAIGN_COLUMNS: &str = "id, campaign_id, lead_email, instantly_campaign_id, name, status, \
     delivery_status, org_id, run_id, metadata, created_at, updated_at";

const COST_COLUMNS: &str = "id, campaign_id, lead_email, step, run_id, cost_id, status";

/// Resultado de insertar una sub-campaña.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(CampaignRecord),
    /// (campaign_id, lead_email) ya existe.
    Duplicate,
}

#[derive(Clone, Debug)]
pub struct CampaignStore {
    db_pool: Pool<Sqlite>,
}

impl CampaignStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        CampaignStore { db_pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // campañas
    // ------------------------------------------------------------------

    pub async fn find_campaign(
        &self,
        campaign_id: &str,
        lead_email: &str,
    ) -> Result<Option<CampaignRecord>> {
        let sql = format!(
            "SELECT {} FROM campaigns WHERE campaign_id = ?1 AND lead_email = ?2",
            CAMPAIGN_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(campaign_id)
            .bind(lead_email)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to look up campaign")?;
        row.map(|r| campaign_from_row(&r)).transpose()
    }

    pub async fn find_by_instantly_id(
        &self,
        instantly_campaign_id: &str,
    ) -> Result<Option<CampaignRecord>> {
        let sql = format!(
            "SELECT {} FROM campaigns WHERE instantly_campaign_id = ?1",
            CAMPAIGN_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(instantly_campaign_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to look up campaign by Instantly id")?;
        row.map(|r| campaign_from_row(&r)).transpose()
    }

    pub async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<CampaignRecord>> {
        let sql = format!(
            "SELECT {} FROM campaigns WHERE status = ?1 ORDER BY created_at",
            CAMPAIGN_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.db_pool)
            .await
            .context("Failed to list campaigns")?;
        rows.iter().map(campaign_from_row).collect()
    }

    pub async fn insert_campaign(&self, new: &NewCampaign) -> Result<InsertOutcome> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let metadata = new.metadata.as_ref().map(|m| m.to_string());

        let res = sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, campaign_id, lead_email, instantly_campaign_id, name,
                status, delivery_status, org_id, run_id, metadata,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, 'active', 'pending', ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(&id)
        .bind(&new.campaign_id)
        .bind(&new.lead_email)
        .bind(&new.instantly_campaign_id)
        .bind(&new.name)
        .bind(&new.org_id)
        .bind(&new.run_id)
        .bind(metadata)
        .bind(&now)
        .execute(&self.db_pool)
        .await;

        match res {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Ok(InsertOutcome::Duplicate);
            }
            Err(e) => return Err(e).context("Failed to insert campaign"),
        }

        let record = self
            .find_by_instantly_id(&new.instantly_campaign_id)
            .await?
            .context("Campaign vanished right after insert")?;
        Ok(InsertOutcome::Inserted(record))
    }

    pub async fn update_delivery_status(&self, id: &str, status: DeliveryStatus) -> Result<()> {
        sqlx::query("UPDATE campaigns SET delivery_status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.db_pool)
            .await
            .context("Failed to update delivery status")?;
        Ok(())
    }

    pub async fn update_status(&self, id: &str, status: CampaignStatus) -> Result<()> {
        sqlx::query("UPDATE campaigns SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.db_pool)
            .await
            .context("Failed to update campaign status")?;
        Ok(())
    }

    /// Pasa la campaña a `error` y guarda el motivo en su metadata, sin tocar
    /// las demás keys. Devuelve false si ya estaba en `error` (o ya no
    /// existe).
    pub async fn mark_error(&self, id: &str, reason: &str) -> Result<bool> {
        let row = sqlx::query("SELECT metadata FROM campaigns WHERE id = ?1 AND status != 'error'")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to load campaign metadata")?;
        let Some(row) = row else {
            return Ok(false);
        };

        let existing: Option<String> = row.try_get("metadata")?;
        let now = Utc::now().to_rfc3339();
        let merged = merge_error_metadata(existing.as_deref(), reason, &now);

        let res = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'error',
                delivery_status = 'failed',
                metadata = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status != 'error'
            "#,
        )
        .bind(id)
        .bind(merged.to_string())
        .bind(&now)
        .execute(&self.db_pool)
        .await
        .context("Failed to mark campaign as error")?;

        Ok(res.rows_affected() > 0)
    }

    pub async fn insert_lead(&self, lead: &NewLead) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO leads (
                id, campaign_id, instantly_campaign_id, email,
                first_name, last_name, company, variables, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&id)
        .bind(&lead.campaign_id)
        .bind(&lead.instantly_campaign_id)
        .bind(&lead.email)
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.company)
        .bind(lead.variables.as_ref().map(|v| v.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await
        .context("Failed to insert lead")?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // costos de la secuencia
    // ------------------------------------------------------------------

    pub async fn insert_cost(
        &self,
        campaign_id: &str,
        lead_email: &str,
        step: i64,
        run_id: &str,
        cost_id: &str,
        status: CostStatus,
    ) -> Result<SequenceCostRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO sequence_costs (
                id, campaign_id, lead_email, step, run_id, cost_id,
                status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&id)
        .bind(campaign_id)
        .bind(lead_email)
        .bind(step)
        .bind(run_id)
        .bind(cost_id)
        .bind(status.as_str())
        .bind(&now)
        .execute(&self.db_pool)
        .await
        .context("Failed to insert sequence cost")?;

        Ok(SequenceCostRecord {
            id,
            campaign_id: campaign_id.to_string(),
            lead_email: lead_email.to_string(),
            step,
            run_id: run_id.to_string(),
            cost_id: cost_id.to_string(),
            status,
        })
    }

    pub async fn list_costs(
        &self,
        campaign_id: &str,
        lead_email: &str,
    ) -> Result<Vec<SequenceCostRecord>> {
        let sql = format!(
            "SELECT {} FROM sequence_costs WHERE campaign_id = ?1 AND lead_email = ?2 ORDER BY step",
            COST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(campaign_id)
            .bind(lead_email)
            .fetch_all(&self.db_pool)
            .await
            .context("Failed to list sequence costs")?;
        rows.iter().map(cost_from_row).collect()
    }

    pub async fn list_costs_with_status(
        &self,
        campaign_id: &str,
        lead_email: &str,
        statuses: &[CostStatus],
    ) -> Result<Vec<SequenceCostRecord>> {
        Ok(self
            .list_costs(campaign_id, lead_email)
            .await?
            .into_iter()
            .filter(|c| statuses.contains(&c.status))
            .collect())
    }

    pub async fn find_cost(
        &self,
        campaign_id: &str,
        lead_email: &str,
        step: i64,
        status: CostStatus,
    ) -> Result<Option<SequenceCostRecord>> {
        let sql = format!(
            "SELECT {} FROM sequence_costs \
             WHERE campaign_id = ?1 AND lead_email = ?2 AND step = ?3 AND status = ?4",
            COST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(campaign_id)
            .bind(lead_email)
            .bind(step)
            .bind(status.as_str())
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to look up sequence cost")?;
        row.map(|r| cost_from_row(&r)).transpose()
    }

    /// Transición condicional; false si el costo ya no estaba en `from`.
    pub async fn transition_cost(&self, id: &str, from: CostStatus, to: CostStatus) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE sequence_costs SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await
        .context("Failed to update sequence cost")?;
        Ok(res.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // eventos de webhook
    // ------------------------------------------------------------------

    pub async fn insert_webhook_event(&self, event: &NewWebhookEvent) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, event_type, instantly_campaign_id, lead_email, email_account,
                step, variant, event_timestamp, payload, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&id)
        .bind(&event.event_type)
        .bind(&event.instantly_campaign_id)
        .bind(&event.lead_email)
        .bind(&event.email_account)
        .bind(event.step)
        .bind(event.variant)
        .bind(&event.event_timestamp)
        .bind(event.payload.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await
        .context("Failed to insert webhook event")?;
        Ok(id)
    }

    #[cfg(test)]
    pub async fn count_webhook_events(&self, instantly_campaign_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM webhook_events WHERE instantly_campaign_id = ?1")
            .bind(instantly_campaign_id)
            .fetch_one(&self.db_pool)
            .await?;
        Ok(row.try_get("cnt")?)
    }
}

fn merge_error_metadata(existing: Option<&str>, reason: &str, at: &str) -> serde_json::Value {
    let mut map = match existing.and_then(|raw| serde_json::from_str(raw).ok()) {
        Some(serde_json::Value::Object(map)) => map,
        Some(other) => {
            let mut map = serde_json::Map::new();
            map.insert("previous".to_string(), other);
            map
        }
        None => serde_json::Map::new(),
    };
    map.insert("lastError".to_string(), reason.into());
    map.insert("errorDetectedAt".to_string(), at.into());
    serde_json::Value::Object(map)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Bad timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn campaign_from_row(r: &SqliteRow) -> Result<CampaignRecord> {
    let metadata: Option<String> = r.try_get("metadata")?;
    let status: String = r.try_get("status")?;
    let delivery_status: String = r.try_get("delivery_status")?;
    let created_at: String = r.try_get("created_at")?;
    let updated_at: String = r.try_get("updated_at")?;

    Ok(CampaignRecord {
        id: r.try_get("id")?,
        campaign_id: r.try_get("campaign_id")?,
        lead_email: r.try_get("lead_email")?,
        instantly_campaign_id: r.try_get("instantly_campaign_id")?,
        name: r.try_get("name")?,
        status: status.parse()?,
        delivery_status: delivery_status.parse()?,
        org_id: r.try_get("org_id")?,
        run_id: r.try_get("run_id")?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn cost_from_row(r: &SqliteRow) -> Result<SequenceCostRecord> {
    let status: String = r.try_get("status")?;
    Ok(SequenceCostRecord {
        id: r.try_get("id")?,
        campaign_id: r.try_get("campaign_id")?,
        lead_email: r.try_get("lead_email")?,
        step: r.try_get("step")?,
        run_id: r.try_get("run_id")?,
        cost_id: r.try_get("cost_id")?,
        status: status.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_metadata_keeps_unrelated_keys() {
        let merged = merge_error_metadata(Some(r#"{"source":"api","lastError":"old"}"#), "boom", "t");
        assert_eq!(merged["source"], json!("api"));
        assert_eq!(merged["lastError"], json!("boom"));
        assert_eq!(merged["errorDetectedAt"], json!("t"));
    }

    #[test]
    fn error_metadata_from_nothing() {
        let merged = merge_error_metadata(None, "boom", "t");
        assert_eq!(merged, json!({ "lastError": "boom", "errorDetectedAt": "t" }));
    }
}
