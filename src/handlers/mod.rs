//! handlers/mod.rs
pub mod auth;
pub mod campaign_handler;
pub mod send_handler;
pub mod webhook_handler;
