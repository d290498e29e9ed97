//! Price-history providers and their composition: file-snapshot and
//! HTTP-backed sources, per-run request budgets, ordered fallback chains,
//! bounded-retry HTTP plumbing, and the on-disk snapshot cache.

pub mod budget;
pub mod cache;
pub mod cached;
pub mod chain;
pub mod fallback;
pub mod file_snapshot;
pub mod http;
pub mod limited;
pub mod retry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use budget::BudgetManager;
pub use cache::CacheStore;
pub use cached::CachedProvider;
pub use chain::{build_provider, ProviderChain};
pub use fallback::FallbackProvider;
pub use file_snapshot::FileSnapshotProvider;
pub use http::{HttpHistoryProvider, HttpProviderKind};
pub use limited::LimitedProvider;
pub use retry::{with_backoff, BackoffPolicy};
