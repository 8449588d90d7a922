//! Storage abstraction over the conversion ledger, replay nonces and
//! click context.
//!
//! Handlers depend on the [`Storage`] trait only; [`PostgresStorage`]
//! backs the real service, while the in-memory implementation backs
//! the test suite. All idempotency and replay decisions map to unique
//! insert outcomes so they stay atomic under concurrent requests.

use async_trait::async_trait;

use primitives::{ClickContext, ConversionRecord, NonceRecord};

use crate::db::{self, DbPool, PoolError};

/// Result of recording a conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// `false` when a record with the same `tracking_id` already existed.
    pub created: bool,
    pub record: ConversionRecord,
}

#[async_trait]
pub trait Storage: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Marks a nonce as used; `false` means it was seen before.
    async fn insert_nonce(&self, nonce: &NonceRecord) -> Result<bool, Self::Error>;

    /// Records a conversion exactly once per `tracking_id`.
    async fn record_conversion(
        &self,
        conversion: &ConversionRecord,
    ) -> Result<RecordOutcome, Self::Error>;

    /// Attaches the notification audit trail to a recorded conversion.
    async fn attach_notification(
        &self,
        tracking_id: &str,
        sent: bool,
        response: &str,
    ) -> Result<bool, Self::Error>;

    async fn conversion(&self, tracking_id: &str)
        -> Result<Option<ConversionRecord>, Self::Error>;

    /// Captures click context; `false` means the `tracking_id` already
    /// has context (first click wins).
    async fn insert_click(&self, click: &ClickContext) -> Result<bool, Self::Error>;

    async fn click_context(&self, tracking_id: &str)
        -> Result<Option<ClickContext>, Self::Error>;
}

#[derive(Clone)]
pub struct PostgresStorage {
    pool: DbPool,
}

impl PostgresStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    type Error = PoolError;

    async fn insert_nonce(&self, nonce: &NonceRecord) -> Result<bool, Self::Error> {
        db::nonce::insert_nonce(&self.pool, nonce).await
    }

    async fn record_conversion(
        &self,
        conversion: &ConversionRecord,
    ) -> Result<RecordOutcome, Self::Error> {
        match db::conversion::insert_conversion(&self.pool, conversion).await? {
            Some(record) => Ok(RecordOutcome {
                created: true,
                record,
            }),
            None => {
                // conversion rows are never deleted, so the conflicting
                // row is still there to be read back
                let record = db::conversion::fetch_conversion(&self.pool, &conversion.tracking_id)
                    .await?
                    .unwrap_or_else(|| conversion.clone());

                Ok(RecordOutcome {
                    created: false,
                    record,
                })
            }
        }
    }

    async fn attach_notification(
        &self,
        tracking_id: &str,
        sent: bool,
        response: &str,
    ) -> Result<bool, Self::Error> {
        db::conversion::update_notification(&self.pool, tracking_id, sent, response).await
    }

    async fn conversion(
        &self,
        tracking_id: &str,
    ) -> Result<Option<ConversionRecord>, Self::Error> {
        db::conversion::fetch_conversion(&self.pool, tracking_id).await
    }

    async fn insert_click(&self, click: &ClickContext) -> Result<bool, Self::Error> {
        db::click::insert_click(&self.pool, click).await
    }

    async fn click_context(
        &self,
        tracking_id: &str,
    ) -> Result<Option<ClickContext>, Self::Error> {
        db::click::fetch_click(&self.pool, tracking_id).await
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryStorage, Unavailable};

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use dashmap::DashMap;
    use thiserror::Error;

    use primitives::{ClickContext, ConversionRecord, NonceRecord};

    use super::{RecordOutcome, Storage};

    #[derive(Debug, Error, PartialEq, Eq)]
    #[error("storage is unavailable")]
    pub struct Unavailable;

    /// In-memory storage with the same uniqueness semantics as the
    /// Postgres schema. `DashMap`'s entry API keeps the unique inserts
    /// atomic, mirroring `ON CONFLICT DO NOTHING`.
    #[derive(Clone, Default)]
    pub struct MemoryStorage {
        nonces: Arc<DashMap<String, NonceRecord>>,
        conversions: Arc<DashMap<String, ConversionRecord>>,
        clicks: Arc<DashMap<String, ClickContext>>,
        broken: Arc<AtomicBool>,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every storage call fail, for transient-error tests.
        pub fn break_storage(&self) {
            self.broken.store(true, Ordering::SeqCst);
        }

        pub fn restore(&self) {
            self.broken.store(false, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), Unavailable> {
            if self.broken.load(Ordering::SeqCst) {
                Err(Unavailable)
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Storage for MemoryStorage {
        type Error = Unavailable;

        async fn insert_nonce(&self, nonce: &NonceRecord) -> Result<bool, Self::Error> {
            self.check()?;

            let mut inserted = false;
            self.nonces.entry(nonce.nonce.clone()).or_insert_with(|| {
                inserted = true;
                nonce.clone()
            });

            Ok(inserted)
        }

        async fn record_conversion(
            &self,
            conversion: &ConversionRecord,
        ) -> Result<RecordOutcome, Self::Error> {
            self.check()?;

            let mut created = false;
            let record = self
                .conversions
                .entry(conversion.tracking_id.clone())
                .or_insert_with(|| {
                    created = true;
                    conversion.clone()
                })
                .clone();

            Ok(RecordOutcome { created, record })
        }

        async fn attach_notification(
            &self,
            tracking_id: &str,
            sent: bool,
            response: &str,
        ) -> Result<bool, Self::Error> {
            self.check()?;

            match self.conversions.get_mut(tracking_id) {
                Some(mut record) => {
                    record.notification_sent = Some(sent);
                    record.notification_sent_at = Some(chrono::Utc::now());
                    record.notification_response = Some(response.to_string());

                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn conversion(
            &self,
            tracking_id: &str,
        ) -> Result<Option<ConversionRecord>, Self::Error> {
            self.check()?;

            Ok(self
                .conversions
                .get(tracking_id)
                .map(|record| record.clone()))
        }

        async fn insert_click(&self, click: &ClickContext) -> Result<bool, Self::Error> {
            self.check()?;

            let mut inserted = false;
            self.clicks.entry(click.tracking_id.clone()).or_insert_with(|| {
                inserted = true;
                click.clone()
            });

            Ok(inserted)
        }

        async fn click_context(
            &self,
            tracking_id: &str,
        ) -> Result<Option<ClickContext>, Self::Error> {
            self.check()?;

            Ok(self.clicks.get(tracking_id).map(|click| click.clone()))
        }
    }

}
