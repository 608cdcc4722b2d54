use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::{LockService, LockToken};
use crate::error::EngineResult;

/// Process-local advisory locks.
#[derive(Debug, Default)]
pub struct MemoryLockService {
    holders: Mutex<HashMap<String, LockToken>>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if someone holds `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        self.holders.lock().contains_key(key)
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn acquire(&self, key: &str) -> EngineResult<Option<LockToken>> {
        let mut holders = self.holders.lock();
        if holders.contains_key(key) {
            debug!(key, "Lock busy");
            return Ok(None);
        }
        let token = LockToken::new(key);
        holders.insert(key.to_string(), token.clone());
        Ok(Some(token))
    }

    async fn release(&self, token: &LockToken) -> EngineResult<()> {
        let mut holders = self.holders.lock();
        if holders
            .get(&token.key)
            .is_some_and(|held| held.holder == token.holder)
        {
            holders.remove(&token.key);
        }
        Ok(())
    }
}
