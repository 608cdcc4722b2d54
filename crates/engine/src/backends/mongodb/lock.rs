use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, Document, doc};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use super::is_duplicate_key;
use crate::core::{LockService, LockToken};
use crate::error::EngineResult;

/// Locks as documents with a unique `_id`.
///
/// A TTL index on `acquiredAt` frees locks whose holder died without
/// releasing them.
#[derive(Debug, Clone)]
pub struct MongoLockService {
    locks: Collection<Document>,
}

impl MongoLockService {
    /// Creates the TTL index if needed.
    pub async fn init(db: &Database, ttl_secs: u64) -> EngineResult<Self> {
        let locks: Collection<Document> = db.collection("locks");
        let index = IndexModel::builder()
            .keys(doc! {"acquiredAt": 1})
            .options(
                IndexOptions::builder()
                    .expire_after(Duration::from_secs(ttl_secs))
                    .build(),
            )
            .build();
        locks.create_index(index).await?;
        Ok(Self { locks })
    }
}

#[async_trait]
impl LockService for MongoLockService {
    async fn acquire(&self, key: &str) -> EngineResult<Option<LockToken>> {
        let token = LockToken::new(key);
        let document = doc! {
            "_id": &token.key,
            "holder": &token.holder,
            "acquiredAt": bson::DateTime::from_millis(token.acquired_at.timestamp_millis()),
        };
        match self.locks.insert_one(document).await {
            Ok(_) => Ok(Some(token)),
            Err(e) if is_duplicate_key(&e) => {
                tracing::debug!(key, "Lock already held");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self, token: &LockToken) -> EngineResult<()> {
        self.locks
            .delete_one(doc! {"_id": &token.key, "holder": &token.holder})
            .await?;
        Ok(())
    }
}
