//! services/mod.rs
//! Clientes externos, el store y la orquestación que va encima.

pub mod account_picker;
pub mod campaign_store;
pub mod cost_lifecycle;
pub mod health_poller;
pub mod instantly_client;
pub mod key_service;
pub mod notifier;
pub mod runs_client;
pub mod send_orchestrator;
pub mod side_effects;
pub mod signature;
pub mod webhook_reconciler;
