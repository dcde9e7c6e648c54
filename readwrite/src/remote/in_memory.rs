//! In-memory remote for tests and dry runs.
//!
//! This provides a [`Remote`] backed by a `HashMap`, removing the need for a
//! running storage service. The remote is [`Clone`] so tests can hold a handle
//! for direct inspection and fault injection while the harness owns a copy.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Bucket, Error, Remote, Result, bucket_name};

/// Downloads are streamed into the sink in chunks of this size.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Store {
    buckets: HashMap<String, BTreeMap<String, Bytes>>,
    list_calls: Vec<Instant>,
    fail_puts: bool,
    fail_gets: bool,
}

/// A [`Remote`] that keeps all buckets in process memory.
#[derive(Debug, Clone)]
pub struct InMemoryRemote {
    bucket_prefix: String,
    store: Arc<Mutex<Store>>,
}

impl InMemoryRemote {
    /// Creates an empty remote whose buckets are named with the given prefix.
    pub fn new(bucket_prefix: impl Into<String>) -> Self {
        Self {
            bucket_prefix: bucket_prefix.into(),
            store: Default::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the names of all existing buckets.
    pub fn buckets(&self) -> Vec<String> {
        self.lock().buckets.keys().cloned().collect()
    }

    /// Returns the sorted keys of a bucket, or `None` if it does not exist.
    pub fn keys(&self, bucket: &str) -> Option<Vec<String>> {
        let store = self.lock();
        Some(store.buckets.get(bucket)?.keys().cloned().collect())
    }

    /// Returns a clone of the stored object, if present.
    pub fn get_stored(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock().buckets.get(bucket)?.get(key).cloned()
    }

    /// Stores an object directly, bypassing the [`Bucket`] trait.
    pub fn insert(&self, bucket: &str, key: &str, payload: Bytes) -> Result<()> {
        self.lock()
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::NoSuchBucket(bucket.to_owned()))?
            .insert(key.to_owned(), payload);
        Ok(())
    }

    /// Flips the last byte of a stored object so it fails verification.
    ///
    /// Returns `false` if there is no such non-empty object.
    pub fn corrupt(&self, bucket: &str, key: &str) -> bool {
        let mut store = self.lock();
        let Some(object) = store.buckets.get_mut(bucket).and_then(|b| b.get_mut(key)) else {
            return false;
        };
        let mut data = object.to_vec();
        let Some(last) = data.last_mut() else {
            return false;
        };
        *last ^= 0xff;
        *object = data.into();
        true
    }

    /// Makes all subsequent uploads fail.
    pub fn fail_puts(&self, fail: bool) {
        self.lock().fail_puts = fail;
    }

    /// Makes all subsequent downloads fail.
    pub fn fail_gets(&self, fail: bool) {
        self.lock().fail_gets = fail;
    }

    /// Returns the time of every `list_keys` call so far.
    pub fn list_calls(&self) -> Vec<Instant> {
        self.lock().list_calls.clone()
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new("readwrite-")
    }
}

#[async_trait::async_trait]
impl Remote for InMemoryRemote {
    async fn create_bucket(&self) -> Result<Arc<dyn Bucket>> {
        let name = bucket_name(&self.bucket_prefix);
        self.lock().buckets.insert(name.clone(), BTreeMap::new());

        Ok(Arc::new(InMemoryBucket {
            name,
            remote: self.clone(),
        }))
    }

    async fn teardown(&self, bucket: &dyn Bucket) -> Result<()> {
        self.lock().buckets.remove(bucket.name());
        Ok(())
    }
}

#[derive(Debug)]
struct InMemoryBucket {
    name: String,
    remote: InMemoryRemote,
}

#[async_trait::async_trait]
impl Bucket for InMemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        // every call on a real remote is a suspension point
        tokio::task::yield_now().await;

        let mut store = self.remote.lock();
        store.list_calls.push(Instant::now());
        let bucket = store
            .buckets
            .get(&self.name)
            .ok_or_else(|| Error::NoSuchBucket(self.name.clone()))?;
        Ok(bucket.keys().cloned().collect())
    }

    async fn put(&self, key: &str, payload: Bytes) -> Result<()> {
        tokio::task::yield_now().await;

        let mut store = self.remote.lock();
        if store.fail_puts {
            return Err(Error::Injected("put"));
        }
        store
            .buckets
            .get_mut(&self.name)
            .ok_or_else(|| Error::NoSuchBucket(self.name.clone()))?
            .insert(key.to_owned(), payload);
        Ok(())
    }

    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        tokio::task::yield_now().await;

        let payload = {
            let store = self.remote.lock();
            if store.fail_gets {
                return Err(Error::Injected("get"));
            }
            store
                .buckets
                .get(&self.name)
                .ok_or_else(|| Error::NoSuchBucket(self.name.clone()))?
                .get(key)
                .cloned()
                .ok_or_else(|| Error::NoSuchKey(key.to_owned()))?
        };

        for chunk in payload.chunks(CHUNK_SIZE) {
            sink.write_all(chunk).await?;
        }
        sink.flush().await?;
        Ok(())
    }
}
