//! models/mod.rs
//! Registros persistidos y payloads de red.

pub mod campaign_model;
pub mod cost_model;
pub mod instantly_model;
pub mod ledger_model;
pub mod send_model;
pub mod webhook_model;
