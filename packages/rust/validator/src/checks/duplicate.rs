use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use feedscout_shared::ReasonCode;

use super::{CheckContext, CheckFailure, QualityCheck};

/// Content hashes claimed during the current run, shared by all workers.
#[derive(Debug, Clone, Default)]
pub struct DuplicateRegistry {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl DuplicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `hash`. Returns `false` if another candidate already holds it.
    pub fn claim(&self, hash: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.to_string())
    }

    /// Give a claim back, e.g. when retrieval of the claimant fails.
    pub fn release(&self, hash: &str) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(hash);
    }

    pub fn is_claimed(&self, hash: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(hash)
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateCheck {
    registry: DuplicateRegistry,
}

impl DuplicateCheck {
    pub fn new(registry: DuplicateRegistry) -> Self {
        Self { registry }
    }
}

impl QualityCheck for DuplicateCheck {
    fn check(&self, ctx: &CheckContext<'_>) -> Result<(), CheckFailure> {
        if self.registry.claim(ctx.content_hash) {
            Ok(())
        } else {
            Err(CheckFailure::new(
                ReasonCode::DuplicateContent,
                format!("content hash {} already accepted this run", ctx.content_hash),
            ))
        }
    }

    fn name(&self) -> &str {
        "duplicate"
    }
}
