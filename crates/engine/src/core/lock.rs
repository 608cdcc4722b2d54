//! Advisory locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineResult;

/// Proof of a held lock, needed to release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    /// Locked key.
    pub key: String,
    /// Unique id of this holder.
    pub holder: String,
    /// Acquisition time.
    pub acquired_at: DateTime<Utc>,
}

impl LockToken {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            holder: uuid::Uuid::new_v4().to_string(),
            acquired_at: Utc::now(),
        }
    }
}

/// Exclusive, non-blocking locks keyed by string.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Takes the lock, or returns `None` if someone else holds it.
    async fn acquire(&self, key: &str) -> EngineResult<Option<LockToken>>;

    /// Releases a lock. Releasing a lock held by another holder is a no-op.
    async fn release(&self, token: &LockToken) -> EngineResult<()>;
}
