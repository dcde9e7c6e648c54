//! Storage services the harness can run against.
//!
//! A [`Remote`] creates and destroys buckets. A [`Bucket`] performs the
//! individual operations that workers measure. Every call on a bucket is a
//! suspension point, so the workers sharing it never block each other.

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::io::AsyncWrite;

mod in_memory;
mod s3_compatible;

pub use in_memory::InMemoryRemote;
pub use s3_compatible::{S3Remote, S3RemoteConfig};

/// Errors returned by storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error emitted from the S3 client.
    #[error(transparent)]
    S3(#[from] s3::error::S3Error),
    /// Invalid or unavailable S3 credentials.
    #[error(transparent)]
    Credentials(#[from] s3::creds::error::CredentialsError),
    /// The service answered with a status code that indicates failure.
    #[error("unexpected status {status} for `{path}`")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The bucket or object path of the request.
        path: String,
    },
    /// Writing downloaded content into the sink failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The bucket does not exist.
    #[error("no such bucket: `{0}`")]
    NoSuchBucket(String),
    /// The key does not exist in the bucket.
    #[error("no such key: `{0}`")]
    NoSuchKey(String),
    /// A failure injected into the in-memory remote.
    #[error("injected failure: {0}")]
    Injected(&'static str),
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A storage service that hands out buckets.
#[async_trait::async_trait]
pub trait Remote: Debug + Send + Sync + 'static {
    /// Creates a new, empty bucket with a unique name.
    async fn create_bucket(&self) -> Result<Arc<dyn Bucket>>;

    /// Deletes all objects in the bucket and then the bucket itself.
    ///
    /// This is idempotent and tolerates keys or the bucket having vanished already.
    async fn teardown(&self, bucket: &dyn Bucket) -> Result<()>;
}

/// A single bucket, shared by all workers of a run.
#[async_trait::async_trait]
pub trait Bucket: Debug + Send + Sync + 'static {
    /// The name of the bucket.
    fn name(&self) -> &str;

    /// Returns a snapshot of all keys currently stored in the bucket.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Uploads `payload` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, payload: Bytes) -> Result<()>;

    /// Downloads the object at `key`, streaming its content into `sink`.
    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()>;
}

/// Generates a bucket name that is unique with high probability.
///
/// S3 bucket names must be lowercase, so the random suffix is lowercased.
pub(crate) fn bucket_name(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(16)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();

    format!("{prefix}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_names_are_unique_and_lowercase() {
        let a = bucket_name("readwrite-");
        let b = bucket_name("readwrite-");

        assert_ne!(a, b);
        assert!(a.starts_with("readwrite-"));
        assert_eq!(a.len(), "readwrite-".len() + 16);
        assert!(!a.chars().any(|c| c.is_ascii_uppercase()));
    }
}
