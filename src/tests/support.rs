//! tests/support.rs
//! Store en memoria y fakes programables de los servicios externos.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use crate::{
    errors::{CredentialError, PlatformError},
    models::{
        cost_model::CostStatus,
        instantly_model::{
            Account, AddLeadRequest, CampaignDetails, CampaignSettings, CreateCampaignRequest,
        },
        ledger_model::{CreateRunRequest, RunStatus},
        send_model::SendRequest,
    },
    services::{
        campaign_store::CampaignStore,
        cost_lifecycle::CostLifecycle,
        health_poller::HealthPoller,
        instantly_client::DeliveryPlatform,
        key_service::SecretResolver,
        notifier::{Notification, Notifier},
        runs_client::Ledger,
        send_orchestrator::SendOrchestrator,
        webhook_reconciler::WebhookReconciler,
    },
};

pub const MISSING_ORG: &str = "org_without_key";

pub async fn test_store() -> CampaignStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let store = CampaignStore::new(pool);
    store.run_migrations().await.expect("migrations");
    store
}

// ----------------------------------------------------------------------
// Instantly
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct FakePlatform {
    accounts: Vec<Account>,
    /// Se consume por campaña creada: true hace que esa campaña reporte "not sending".
    unhealthy_script: Mutex<VecDeque<bool>>,
    health: Mutex<HashMap<String, serde_json::Value>>,
    failing_gets: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    pub account_lists: AtomicUsize,
    pub created: Mutex<Vec<(String, CreateCampaignRequest)>>,
    pub settings: Mutex<Vec<(String, CampaignSettings)>>,
    pub leads: Mutex<Vec<AddLeadRequest>>,
    pub activated: Mutex<Vec<String>>,
}

impl FakePlatform {
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        FakePlatform {
            accounts,
            ..Default::default()
        }
    }

    pub fn single_sender() -> Self {
        Self::with_accounts(vec![Account {
            email: "sender@outreach.example".to_string(),
            signature: Some("<p>Best, Sam</p>".to_string()),
        }])
    }

    pub fn script_unhealthy(&self, attempts: &[bool]) {
        self.unhealthy_script
            .lock()
            .unwrap()
            .extend(attempts.iter().copied());
    }

    pub fn set_not_sending(&self, instantly_id: &str, flag: serde_json::Value) {
        self.health
            .lock()
            .unwrap()
            .insert(instantly_id.to_string(), flag);
    }

    pub fn fail_get(&self, instantly_id: &str) {
        self.failing_gets
            .lock()
            .unwrap()
            .insert(instantly_id.to_string());
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn created_ids(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl DeliveryPlatform for FakePlatform {
    async fn list_accounts(&self, _api_key: &str) -> Result<Vec<Account>, PlatformError> {
        self.account_lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.clone())
    }

    async fn create_campaign(
        &self,
        _api_key: &str,
        req: &CreateCampaignRequest,
    ) -> Result<CampaignDetails, PlatformError> {
        let id = format!("inst_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        if self.unhealthy_script.lock().unwrap().pop_front() == Some(true) {
            self.set_not_sending(&id, json!(1));
        }
        self.created.lock().unwrap().push((id.clone(), req.clone()));
        Ok(CampaignDetails {
            id,
            name: Some(req.name.clone()),
            status: Some(0),
            not_sending_status: None,
        })
    }

    async fn update_campaign(
        &self,
        _api_key: &str,
        campaign_id: &str,
        settings: &CampaignSettings,
    ) -> Result<(), PlatformError> {
        self.settings
            .lock()
            .unwrap()
            .push((campaign_id.to_string(), settings.clone()));
        Ok(())
    }

    async fn add_lead(&self, _api_key: &str, lead: &AddLeadRequest) -> Result<(), PlatformError> {
        self.leads.lock().unwrap().push(lead.clone());
        Ok(())
    }

    async fn activate_campaign(
        &self,
        _api_key: &str,
        campaign_id: &str,
    ) -> Result<(), PlatformError> {
        self.activated.lock().unwrap().push(campaign_id.to_string());
        Ok(())
    }

    async fn get_campaign(
        &self,
        _api_key: &str,
        campaign_id: &str,
    ) -> Result<CampaignDetails, PlatformError> {
        if self.failing_gets.lock().unwrap().contains(campaign_id) {
            return Err(PlatformError::Http {
                status: 500,
                body: "upstream exploded".to_string(),
            });
        }
        Ok(CampaignDetails {
            id: campaign_id.to_string(),
            name: None,
            status: Some(1),
            not_sending_status: self.health.lock().unwrap().get(campaign_id).cloned(),
        })
    }
}

// ----------------------------------------------------------------------
// Servicio de runs
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLedger {
    next_run: AtomicUsize,
    next_cost: AtomicUsize,
    /// Número (desde 1) de la llamada a create_run que falla.
    fail_create_run_at: Mutex<Option<usize>>,
    failing_run_updates: Mutex<HashSet<String>>,
    failing_cost_runs: Mutex<HashSet<String>>,
    pub runs: Mutex<HashMap<String, RunStatus>>,
    pub run_errors: Mutex<HashMap<String, String>>,
    pub costs: Mutex<HashMap<String, CostStatus>>,
    pub created_runs: Mutex<Vec<CreateRunRequest>>,
    pub cost_updates: AtomicUsize,
    pub run_updates: AtomicUsize,
}

impl FakeLedger {
    pub fn fail_create_run_at(&self, call: usize) {
        *self.fail_create_run_at.lock().unwrap() = Some(call);
    }

    pub fn fail_run_updates(&self, run_id: &str) {
        self.failing_run_updates
            .lock()
            .unwrap()
            .insert(run_id.to_string());
    }

    pub fn fail_cost_updates(&self, run_id: &str) {
        self.failing_cost_runs
            .lock()
            .unwrap()
            .insert(run_id.to_string());
    }

    pub fn run_status(&self, run_id: &str) -> Option<RunStatus> {
        self.runs.lock().unwrap().get(run_id).copied()
    }

    pub fn cost_status(&self, cost_id: &str) -> Option<CostStatus> {
        self.costs.lock().unwrap().get(cost_id).copied()
    }

    pub fn run_count(&self) -> usize {
        self.created_runs.lock().unwrap().len()
    }

    pub fn cost_count(&self) -> usize {
        self.costs.lock().unwrap().len()
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn create_run(&self, req: &CreateRunRequest) -> Result<String> {
        let n = self.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_create_run_at.lock().unwrap() == Some(n) {
            return Err(anyhow!("runs service unavailable"));
        }
        let id = format!("run_{}", n);
        self.runs.lock().unwrap().insert(id.clone(), RunStatus::Ongoing);
        self.created_runs.lock().unwrap().push(req.clone());
        Ok(id)
    }

    async fn update_run(&self, run_id: &str, status: RunStatus, error: Option<&str>) -> Result<()> {
        self.run_updates.fetch_add(1, Ordering::SeqCst);
        if self.failing_run_updates.lock().unwrap().contains(run_id) {
            return Err(anyhow!("runs service refused update of {}", run_id));
        }
        let mut runs = self.runs.lock().unwrap();
        if runs.get(run_id) == Some(&RunStatus::Completed) && status == RunStatus::Failed {
            return Err(anyhow!("run {} is already completed", run_id));
        }
        runs.insert(run_id.to_string(), status);
        if let Some(e) = error {
            self.run_errors
                .lock()
                .unwrap()
                .insert(run_id.to_string(), e.to_string());
        }
        Ok(())
    }

    async fn add_cost(&self, run_id: &str, status: CostStatus) -> Result<String> {
        let id = format!("cost_{}_{}", run_id, self.next_cost.fetch_add(1, Ordering::SeqCst) + 1);
        self.costs.lock().unwrap().insert(id.clone(), status);
        Ok(id)
    }

    async fn update_cost(&self, run_id: &str, cost_id: &str, status: CostStatus) -> Result<()> {
        self.cost_updates.fetch_add(1, Ordering::SeqCst);
        if self.failing_cost_runs.lock().unwrap().contains(run_id) {
            return Err(anyhow!("runs service refused cost update on {}", run_id));
        }
        self.costs.lock().unwrap().insert(cost_id.to_string(), status);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Keys y avisos
// ----------------------------------------------------------------------

pub struct FakeSecrets;

#[async_trait]
impl SecretResolver for FakeSecrets {
    async fn instantly_key(&self, org_id: Option<&str>) -> Result<String, CredentialError> {
        match org_id {
            Some(MISSING_ORG) => Err(CredentialError::NotConfigured(MISSING_ORG.to_string())),
            Some(org) => Ok(format!("key-{}", org)),
            None => Ok("shared-key".to_string()),
        }
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub fail: bool,
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(anyhow!("smtp down"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Armado
// ----------------------------------------------------------------------

pub struct Harness {
    pub store: CampaignStore,
    pub platform: Arc<FakePlatform>,
    pub ledger: Arc<FakeLedger>,
    pub notifier: Arc<FakeNotifier>,
    pub orchestrator: SendOrchestrator,
    pub reconciler: WebhookReconciler,
    pub poller: HealthPoller,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(FakePlatform::single_sender(), FakeNotifier::default()).await
    }

    pub async fn build(platform: FakePlatform, notifier: FakeNotifier) -> Self {
        let store = test_store().await;
        let platform = Arc::new(platform);
        let ledger = Arc::new(FakeLedger::default());
        let notifier = Arc::new(notifier);
        let secrets = Arc::new(FakeSecrets);

        let orchestrator = SendOrchestrator::new(
            store.clone(),
            platform.clone(),
            secrets.clone(),
            ledger.clone(),
        )
        .with_seed_source(Arc::new(|| 0u64))
        .with_attempt_timeout(Duration::from_secs(5));
        let reconciler = WebhookReconciler::new(
            store.clone(),
            CostLifecycle::new(store.clone(), ledger.clone()),
        );
        let poller = HealthPoller::new(
            store.clone(),
            platform.clone(),
            secrets,
            ledger.clone(),
            notifier.clone(),
            Duration::ZERO,
        );

        Harness {
            store,
            platform,
            ledger,
            notifier,
            orchestrator,
            reconciler,
            poller,
        }
    }
}

pub fn send_request(campaign_id: &str, to: &str, steps: usize) -> SendRequest {
    let sequence: Vec<serde_json::Value> = (1..=steps)
        .map(|i| {
            json!({
                "step": i,
                "bodyHtml": format!("<p>Step {} for {{{{firstName}}}}</p>", i),
                "daysSinceLastStep": if i == 1 { 0 } else { 2 },
            })
        })
        .collect();

    serde_json::from_value(json!({
        "orgId": "org_1",
        "brandId": "brand_1",
        "appId": "app_1",
        "runId": "run_parent",
        "campaignId": campaign_id,
        "to": to,
        "firstName": "Dana",
        "company": "Acme",
        "subject": "Quick question",
        "sequence": sequence,
    }))
    .expect("valid send request")
}
