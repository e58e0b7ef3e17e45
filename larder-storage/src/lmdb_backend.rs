//! LMDB-backed cache implementation with store isolation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a durable,
//! memory-mapped key-value store shared by every store of an application.
//!
//! # Store Isolation
//!
//! All keys are encoded as [`NamespacedKey`], so that:
//! - Entries of different stores never collide
//! - Marking a store stale only touches that store's entries
//!
//! # Record Format
//!
//! `[last_fetched: 8 bytes, i64 LE][value: JSON]`. Marking stale rewrites
//! only the timestamp prefix.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Persisting a write and publishing it to
//! live readers happen under the key's channel lock, so a reader that
//! subscribes concurrently either loads the new record or receives it.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use larder_core::{
    CachedData, Cacheable, PersistenceConfig, PersistenceError, StoreError, StoreKey, StoreResult,
    Timestamp, STALE_TIMESTAMP,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::channels::{into_read_stream, KeyedChannels};
use crate::namespaced_key::NamespacedKey;
use crate::traits::{Cache, CacheReadStream, CacheStats, StatsRecorder};

const TIMESTAMP_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment at {path}: {reason}")]
    EnvOpen { path: String, reason: String },

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error in store {store_id}: {reason}")]
    Serialization { store_id: String, reason: String },

    /// Deserialization error.
    #[error("Deserialization error in store {store_id}: {reason}")]
    Deserialization { store_id: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbCacheError to StoreError.
impl From<LmdbCacheError> for StoreError {
    fn from(e: LmdbCacheError) -> Self {
        let persistence = match e {
            LmdbCacheError::EnvOpen { path, reason } => PersistenceError::EnvOpen { path, reason },
            LmdbCacheError::DbOpen(reason) => PersistenceError::DbOpen { reason },
            LmdbCacheError::Transaction(reason) => PersistenceError::TransactionFailed { reason },
            LmdbCacheError::Serialization { store_id, reason }
            | LmdbCacheError::Deserialization { store_id, reason } => {
                PersistenceError::Serialization { store_id, reason }
            }
            LmdbCacheError::Io(e) => PersistenceError::Io {
                reason: e.to_string(),
            },
        };
        StoreError::Persistence(persistence)
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// An open LMDB environment with its single unnamed database.
///
/// Cheap to clone. Share one environment between every [`LmdbCache`] of an
/// application; each cache writes under its own store id.
#[derive(Clone)]
pub struct LmdbEnvironment {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl std::fmt::Debug for LmdbEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbEnvironment")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbEnvironment {
    /// Open the environment described by `config`.
    pub fn open(config: &PersistenceConfig) -> Result<Self, LmdbCacheError> {
        Self::open_path(&config.path, config.max_size_mb)
    }

    /// Open or create an environment.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open_path<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| LmdbCacheError::EnvOpen {
                path: path.as_ref().display().to_string(),
                reason: format!("map size of {max_size_mb} MB overflows usize"),
            })?;

        std::fs::create_dir_all(&path)?;

        // The environment must not be opened twice in the same process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        debug!(path = %path.as_ref().display(), max_size_mb, "opened LMDB environment");
        Ok(Self { env, db })
    }

    /// Iterate over keys matching a prefix and collect them.
    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(txn_error)? {
            match result {
                Ok((key, _)) if key.starts_with(prefix) => keys.push(key.to_vec()),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping unreadable LMDB entry"),
            }
        }

        Ok(keys)
    }

    fn get_record(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let record = self.db.get(&rtxn, key).map_err(txn_error)?;
        Ok(record.map(<[u8]>::to_vec))
    }

    fn put_record(&self, key: &[u8], record: &[u8]) -> Result<(), LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db.put(&mut wtxn, key, record).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }

    /// Rewrite the timestamp prefix of `key` to [`STALE_TIMESTAMP`].
    ///
    /// Returns false if the record is missing, malformed or already stale.
    fn age_record(&self, key: &[u8]) -> Result<bool, LmdbCacheError> {
        let stale = STALE_TIMESTAMP.to_le_bytes();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let aged = match self.db.get(&wtxn, key).map_err(txn_error)? {
            Some(record) if record.len() >= TIMESTAMP_LEN && record[..TIMESTAMP_LEN] != stale => {
                let mut aged = record.to_vec();
                aged[..TIMESTAMP_LEN].copy_from_slice(&stale);
                aged
            }
            _ => return Ok(false),
        };

        self.db.put(&mut wtxn, key, &aged).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(true)
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// LMDB-backed cache for one store.
///
/// Keep a single `LmdbCache` per store id and environment: live readers are
/// only notified of writes that go through the same instance.
///
/// # Example
///
/// ```ignore
/// let env = LmdbEnvironment::open_path("/tmp/larder", 64)?;
/// let cache: LmdbCache<String, Vec<Rate>> = LmdbCache::new(env, "rates");
///
/// cache.write(CachedData::new("usd".to_string(), rates, now)).await?;
/// let mut reader = cache.read(&"usd".to_string());
/// ```
pub struct LmdbCache<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    env: LmdbEnvironment,
    store_id: String,
    channels: KeyedChannels<K, T>,
    stats: StatsRecorder,
}

impl<K, T> LmdbCache<K, T>
where
    K: StoreKey + Serialize + DeserializeOwned,
    T: Cacheable + Serialize + DeserializeOwned,
{
    pub fn new(env: LmdbEnvironment, store_id: impl Into<String>) -> Self {
        Self {
            env,
            store_id: store_id.into(),
            channels: KeyedChannels::new(),
            stats: StatsRecorder::default(),
        }
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    fn encode_key(&self, key: &K) -> Result<Vec<u8>, LmdbCacheError> {
        NamespacedKey::from_key(&self.store_id, key)
            .map(|k| k.encode())
            .map_err(|e| LmdbCacheError::Serialization {
                store_id: self.store_id.clone(),
                reason: e.to_string(),
            })
    }

    fn encode_record(&self, data: &CachedData<K, T>) -> Result<Vec<u8>, LmdbCacheError> {
        let value_bytes =
            serde_json::to_vec(data.data()).map_err(|e| LmdbCacheError::Serialization {
                store_id: self.store_id.clone(),
                reason: e.to_string(),
            })?;

        let mut full_bytes = Vec::with_capacity(TIMESTAMP_LEN + value_bytes.len());
        full_bytes.extend_from_slice(&data.last_fetched().to_le_bytes());
        full_bytes.extend_from_slice(&value_bytes);
        Ok(full_bytes)
    }

    fn decode_record(&self, key: &K, bytes: &[u8]) -> Result<CachedData<K, T>, LmdbCacheError> {
        let deserialization = |reason: String| LmdbCacheError::Deserialization {
            store_id: self.store_id.clone(),
            reason,
        };

        let timestamp_bytes: [u8; TIMESTAMP_LEN] = bytes
            .get(..TIMESTAMP_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| deserialization("record shorter than timestamp".to_string()))?;
        let last_fetched = Timestamp::from_le_bytes(timestamp_bytes);

        let value: T = serde_json::from_slice(&bytes[TIMESTAMP_LEN..])
            .map_err(|e| deserialization(e.to_string()))?;

        Ok(CachedData::new(key.clone(), value, last_fetched))
    }

    fn load(&self, key: &K) -> Result<Option<CachedData<K, T>>, LmdbCacheError> {
        let encoded = self.encode_key(key)?;
        match self.env.get_record(&encoded)? {
            Some(bytes) => self.decode_record(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Load for a live read; unreadable entries count as absent.
    fn load_or_miss(&self, key: &K) -> Option<CachedData<K, T>> {
        match self.load(key) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(store_id = %self.store_id, key = ?key, error = %e, "treating unreadable cache entry as a miss");
                None
            }
        }
    }

    fn mark_key_stale(&self, key: &K, encoded: &[u8]) -> Result<bool, LmdbCacheError> {
        self.channels.with_sender(key, |sender| -> Result<bool, LmdbCacheError> {
            let aged = self.env.age_record(encoded)?;
            if aged {
                if let Some(sender) = sender {
                    sender.send_if_modified(|snapshot| match snapshot {
                        Some(cached) if !cached.is_marked_stale() => {
                            *cached = cached.marked_stale();
                            true
                        }
                        _ => false,
                    });
                }
            }
            Ok(aged)
        })
    }
}

#[async_trait]
impl<K, T> Cache<K, T> for LmdbCache<K, T>
where
    K: StoreKey + Serialize + DeserializeOwned,
    T: Cacheable + Serialize + DeserializeOwned,
{
    fn read(&self, key: &K) -> CacheReadStream<K, T> {
        let receiver = self.channels.subscribe_or_load(key, || self.load_or_miss(key));
        self.stats.record_read(receiver.borrow().is_some());
        into_read_stream(receiver)
    }

    async fn write(&self, data: CachedData<K, T>) -> StoreResult<()> {
        let encoded = self.encode_key(data.key())?;
        let record = self.encode_record(&data)?;
        let key = data.key().clone();

        self.channels
            .with_sender(&key, |sender| -> Result<(), LmdbCacheError> {
                self.env.put_record(&encoded, &record)?;
                if let Some(sender) = sender {
                    sender.send_replace(Some(data));
                }
                Ok(())
            })?;

        self.stats.record_write();
        debug!(store_id = %self.store_id, key = ?key, bytes = record.len(), "persisted cache entry");
        Ok(())
    }

    async fn mark_as_stale(&self, key: &K) -> StoreResult<()> {
        let encoded = self.encode_key(key)?;
        if self.mark_key_stale(key, &encoded)? {
            self.stats.record_stale_marks(1);
        }
        Ok(())
    }

    async fn mark_all_as_stale(&self) -> StoreResult<u64> {
        let prefix = NamespacedKey::namespace_prefix(&self.store_id);
        let keys = self.env.collect_keys_with_prefix(&prefix)?;

        let mut marked = 0u64;
        for encoded in &keys {
            let aged = match NamespacedKey::decode(encoded).and_then(|k| k.key::<K>().ok()) {
                Some(key) => self.mark_key_stale(&key, encoded)?,
                // Nothing can be subscribed to a key that does not decode.
                None => self.env.age_record(encoded)?,
            };
            if aged {
                marked += 1;
            }
        }

        self.stats.record_stale_marks(marked);
        debug!(store_id = %self.store_id, marked, "marked all cache entries stale");
        Ok(marked)
    }

    fn stats(&self) -> CacheStats {
        let prefix = NamespacedKey::namespace_prefix(&self.store_id);
        let entry_count = match self.env.collect_keys_with_prefix(&prefix) {
            Ok(keys) => keys.len() as u64,
            Err(e) => {
                warn!(store_id = %self.store_id, error = %e, "failed to count cache entries");
                0
            }
        };
        self.stats.snapshot(entry_count)
    }
}
