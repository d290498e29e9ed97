use std::sync::atomic::{AtomicU32, Ordering};

use screener_core::ProviderError;

/// Per-run request budget for one provider instance.
///
/// The counter is in-memory and run-scoped: it resets only when a new
/// instance is constructed, and there is no mid-run reset. A successful
/// consumption is never undone, even if the delegated call later fails.
#[derive(Debug)]
pub struct BudgetManager {
    provider: String,
    max_requests: u32,
    used: AtomicU32,
}

impl BudgetManager {
    pub fn new(provider: impl Into<String>, max_requests: u32) -> Self {
        Self {
            provider: provider.into(),
            max_requests,
            used: AtomicU32::new(0),
        }
    }

    /// Claim one request unit. Once exhausted, every subsequent call errors.
    pub fn consume(&self) -> Result<(), ProviderError> {
        let claimed = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.max_requests).then_some(used + 1)
            });
        match claimed {
            Ok(_) => Ok(()),
            Err(_) => Err(ProviderError::LimitExceeded {
                provider: self.provider.clone(),
                detail: format!("{} requests used this run", self.max_requests),
            }),
        }
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        self.max_requests - self.used()
    }
}
