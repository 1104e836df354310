//! services/account_picker.rs

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

use crate::models::instantly_model::Account;

/// Fuente de semillas para [`pick_account`]; en los tests se usa una fija.
pub type SeedSource = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn random_seeds() -> SeedSource {
    Arc::new(rand::random::<u64>)
}

/// Elige una cuenta al azar, pero siempre la misma para una semilla dada.
pub fn pick_account(pool: &[Account], seed: u64) -> Option<&Account> {
    if pool.is_empty() {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    pool.get(rng.random_range(0..pool.len()))
}
