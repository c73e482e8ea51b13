//! Idempotency guard for payment notifications.
//!
//! A key is marked once a notification went out; the scheduler checks it
//! before every send so the same reminder is not repeated within one
//! calendar day. The in-memory store is per process. Deployments running
//! more than one scheduler should use the Redis store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use redis::{aio::ConnectionManager, Client};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::NotificationKind;

/// Identity of one notification: payment, kind, recipient and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub payment_id: Uuid,
    pub kind: NotificationKind,
    pub recipient_id: Uuid,
    pub date: NaiveDate,
}

impl DedupKey {
    pub fn cache_key(&self) -> String {
        format!(
            "payment-notification:{}:{}:{}:{}",
            self.payment_id,
            self.kind,
            self.recipient_id,
            self.date.format("%Y-%m-%d")
        )
    }
}

#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn seen(&self, key: &DedupKey) -> Result<bool, AppError>;
    async fn mark(&self, key: &DedupKey, sent_at: DateTime<Utc>) -> Result<(), AppError>;
    /// Drop entries sent before `older_than`. Returns how many were removed.
    async fn sweep(&self, older_than: DateTime<Utc>) -> Result<usize, AppError>;
}

/// Process-local store backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryDedupStore {
    entries: DashMap<DedupKey, DateTime<Utc>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn seen(&self, key: &DedupKey) -> Result<bool, AppError> {
        Ok(self.entries.contains_key(key))
    }

    async fn mark(&self, key: &DedupKey, sent_at: DateTime<Utc>) -> Result<(), AppError> {
        self.entries.insert(*key, sent_at);
        Ok(())
    }

    async fn sweep(&self, older_than: DateTime<Utc>) -> Result<usize, AppError> {
        let before = self.entries.len();
        self.entries.retain(|_, sent_at| *sent_at >= older_than);
        Ok(before - self.entries.len())
    }
}

/// Shared store for multi-instance deployments. Keys expire on their own
/// after the retention period, so sweeping is a no-op.
#[derive(Clone)]
pub struct RedisDedupStore {
    manager: ConnectionManager,
    retention_secs: u64,
}

impl RedisDedupStore {
    pub async fn new(url: &str, retention_days: u32) -> Result<Self, AppError> {
        tracing::info!("Connecting to Redis for notification dedup");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get Redis connection manager");
            AppError::RedisError(e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            manager,
            retention_secs: u64::from(retention_days) * 24 * 60 * 60,
        })
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn seen(&self, key: &DedupKey) -> Result<bool, AppError> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(key.cache_key())
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn mark(&self, key: &DedupKey, sent_at: DateTime<Utc>) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key.cache_key())
            .arg(sent_at.to_rfc3339())
            .arg("EX")
            .arg(self.retention_secs)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn sweep(&self, _older_than: DateTime<Utc>) -> Result<usize, AppError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(kind: NotificationKind) -> DedupKey {
        DedupKey {
            payment_id: Uuid::nil(),
            kind,
            recipient_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        }
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(
            key(NotificationKind::DueToday).cache_key(),
            "payment-notification:00000000-0000-0000-0000-000000000000:due_today:00000000-0000-0000-0000-000000000000:2025-06-01"
        );
    }

    #[tokio::test]
    async fn test_mark_then_seen() {
        let store = InMemoryDedupStore::new();
        let reminder = key(NotificationKind::Reminder);

        assert!(!store.seen(&reminder).await.unwrap());
        store.mark(&reminder, Utc::now()).await.unwrap();
        assert!(store.seen(&reminder).await.unwrap());
        assert!(!store.seen(&key(NotificationKind::Overdue)).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_drops_old_entries_only() {
        let store = InMemoryDedupStore::new();
        let now = Utc::now();
        store
            .mark(&key(NotificationKind::Overdue), now - Duration::days(8))
            .await
            .unwrap();
        store
            .mark(&key(NotificationKind::DueToday), now - Duration::days(1))
            .await
            .unwrap();

        let removed = store.sweep(now - Duration::days(7)).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.seen(&key(NotificationKind::DueToday)).await.unwrap());
    }
}
