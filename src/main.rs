use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use sqlx::{sqlite::SqliteConnectOptions, Pool, Sqlite, SqlitePool};
use std::{str::FromStr, sync::Arc, time::Duration};

use crate::config::app_config::AppConfig;
use crate::logger::init_logger;
use crate::services::{
    campaign_store::CampaignStore,
    cost_lifecycle::CostLifecycle,
    health_poller::{spawn_periodic, HealthPoller},
    instantly_client::{DeliveryPlatform, InstantlyClient},
    key_service::{KeyServiceClient, SecretResolver},
    notifier::{LogNotifier, Notifier, SmtpNotifier},
    runs_client::{Ledger, RunsClient},
    send_orchestrator::SendOrchestrator,
    webhook_reconciler::WebhookReconciler,
};

mod app;
mod config;
mod errors;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid DATABASE_URL {}", database_url))?
        .create_if_missing(true);

    // 1) Crear la carpeta de la base si hace falta
    let filename = options.clone().get_filename();
    if let Some(parent) = filename.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {:?}", parent))?;
        }
    }

    // 2) Conectarnos con SQLx
    log::info!("Connecting to SQLite at {}", database_url);
    SqlitePool::connect_with(options)
        .await
        .context("Could not connect to SQLite")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = AppConfig::from_env()?;
    let timeout = config.http_timeout();

    // Base de datos + migraciones
    let db_pool = setup_database(&config.database_url).await?;
    let store = CampaignStore::new(db_pool);
    store.run_migrations().await?;

    // Clientes externos
    let platform: Arc<dyn DeliveryPlatform> =
        Arc::new(InstantlyClient::new(&config.instantly_api_url, timeout)?);
    let secrets: Arc<dyn SecretResolver> = Arc::new(KeyServiceClient::new(
        &config.key_service_url,
        &config.key_service_api_key,
        config.instantly_api_key.clone(),
        timeout,
    )?);
    let ledger: Arc<dyn Ledger> = Arc::new(RunsClient::new(
        &config.runs_service_url,
        &config.runs_service_api_key,
        timeout,
    )?);
    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpNotifier::new(smtp)?),
        None => {
            log::warn!("SMTP not configured, operator notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let orchestrator =
        SendOrchestrator::new(store.clone(), platform.clone(), secrets.clone(), ledger.clone());
    let reconciler = WebhookReconciler::new(
        store.clone(),
        CostLifecycle::new(store.clone(), ledger.clone()),
    );
    let poller = HealthPoller::new(
        store.clone(),
        platform,
        secrets,
        ledger,
        notifier,
        Duration::from_millis(config.health_poll_delay_ms),
    );

    // Poller de salud en segundo plano (0 = apagado)
    if config.health_poll_interval_secs > 0 {
        log::info!(
            "Health poller every {}s",
            config.health_poll_interval_secs
        );
        let _poll_task = spawn_periodic(
            poller.clone(),
            Duration::from_secs(config.health_poll_interval_secs),
        );
    }

    // Levantar servidor
    let port = config.port;
    log::info!("Starting server on 0.0.0.0:{}", port);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .app_data(web::Data::new(reconciler.clone()))
            .app_data(web::Data::new(poller.clone()))
            .configure(app::init_app)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
