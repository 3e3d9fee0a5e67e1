use std::sync::Arc;

use snafu::ResultExt;
use time::OffsetDateTime;

use crate::error::{AuthError, StorageSnafu};
use crate::storage::{KeyValueStore, read_json, remove_logged, write_json};
use crate::token::TokenRecord;

/// Persists the [`TokenRecord`] in durable storage under `{namespace}__token`.
///
/// Never performs network requests.
#[derive(Debug, Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    expiry_margin: time::Duration,
}

impl TokenStore {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        namespace: &str,
        expiry_margin: std::time::Duration,
    ) -> Self {
        Self {
            storage,
            key: format!("{namespace}__token"),
            expiry_margin: time::Duration::try_from(expiry_margin)
                .unwrap_or(time::Duration::MAX),
        }
    }

    /// Persist `record`, stamping `obtained_at` with the current time.
    ///
    /// Returns the record as stored.
    pub fn save(&self, mut record: TokenRecord) -> Result<TokenRecord, AuthError> {
        record.obtained_at = OffsetDateTime::now_utc();
        write_json(self.storage.as_ref(), &self.key, &record).context(StorageSnafu {})?;
        tracing::trace!(expires_at = ?record.expires_at(), "Stored token record.");
        Ok(record)
    }

    /// The stored record. Absent, unreadable and malformed entries all yield `None`.
    pub fn load(&self) -> Option<TokenRecord> {
        read_json::<TokenRecord>(self.storage.as_ref(), &self.key)
    }

    /// Whether `record` must be refreshed before use, honoring the configured margin.
    pub fn is_expired(&self, record: &TokenRecord) -> bool {
        record.is_expired_at(OffsetDateTime::now_utc(), self.expiry_margin)
    }

    pub fn clear(&self) {
        tracing::trace!("Clearing token record.");
        remove_logged(self.storage.as_ref(), &self.key);
    }
}
