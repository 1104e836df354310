//! services/side_effects.rs
//! Ejecuta en orden una lista de efectos secundarios, unos obligatorios y
//! otros best-effort.

use anyhow::{Context, Result};
use futures::future::BoxFuture;

pub struct SideEffect<'a> {
    pub operation: String,
    pub required: bool,
    pub action: BoxFuture<'a, Result<()>>,
}

impl<'a> SideEffect<'a> {
    pub fn required(operation: impl Into<String>, action: BoxFuture<'a, Result<()>>) -> Self {
        SideEffect {
            operation: operation.into(),
            required: true,
            action,
        }
    }

    pub fn optional(operation: impl Into<String>, action: BoxFuture<'a, Result<()>>) -> Self {
        SideEffect {
            operation: operation.into(),
            required: false,
            action,
        }
    }
}

#[derive(Debug, Default)]
pub struct EffectReport {
    pub completed: Vec<String>,
    /// Operaciones opcionales que fallaron, con su error.
    pub failed_optional: Vec<(String, String)>,
}

/// Corre los efectos en orden. Si falla uno opcional se loguea y se anota;
/// si falla uno obligatorio se corta y se devuelve el error.
pub async fn execute(effects: Vec<SideEffect<'_>>) -> Result<EffectReport> {
    let mut report = EffectReport::default();

    for effect in effects {
        match effect.action.await {
            Ok(()) => report.completed.push(effect.operation),
            Err(e) if effect.required => {
                log::error!("(side_effects) required '{}' failed: {:#}", effect.operation, e);
                return Err(e).with_context(|| format!("{} failed", effect.operation));
            }
            Err(e) => {
                log::warn!("(side_effects) optional '{}' failed: {:#}", effect.operation, e);
                report
                    .failed_optional
                    .push((effect.operation, format!("{:#}", e)));
            }
        }
    }

    Ok(report)
}
