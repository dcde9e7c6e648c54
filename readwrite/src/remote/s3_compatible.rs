use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket as S3Bucket, BucketConfiguration, Region};
use tokio::io::AsyncWrite;

use super::{Bucket, Error, Remote, Result, bucket_name};

/// Connection settings for an S3-compatible service.
#[derive(Clone, Default)]
pub struct S3RemoteConfig {
    /// Base URL of the service, for example `http://localhost:9000`.
    pub endpoint: String,
    /// Region to sign requests for.
    pub region: String,
    /// Access key ID. Requests are unsigned unless both keys are set.
    pub access_key: Option<String>,
    /// Secret access key.
    pub secret_key: Option<String>,
    /// Prefix of generated bucket names.
    pub bucket_prefix: String,
}

impl fmt::Debug for S3RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3RemoteConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[redacted]"))
            .field("bucket_prefix", &self.bucket_prefix)
            .finish()
    }
}

/// A [`Remote`] talking to an S3-compatible service with path-style addressing.
#[derive(Debug)]
pub struct S3Remote {
    config: S3RemoteConfig,
}

impl S3Remote {
    /// Creates a remote for the given service. No connection is made until a bucket is created.
    pub fn new(config: S3RemoteConfig) -> Self {
        Self { config }
    }

    fn region(&self) -> Region {
        Region::Custom {
            region: self.config.region.clone(),
            endpoint: self.config.endpoint.clone(),
        }
    }

    fn credentials(&self) -> Result<Credentials> {
        let credentials = match (&self.config.access_key, &self.config.secret_key) {
            (Some(access_key), Some(secret_key)) => Credentials::new(
                Some(access_key.as_str()),
                Some(secret_key.as_str()),
                None,
                None,
                None,
            )?,
            _ => Credentials::anonymous()?,
        };
        Ok(credentials)
    }

    fn open(&self, name: &str) -> Result<Box<S3Bucket>> {
        let bucket = S3Bucket::new(name, self.region(), self.credentials()?)?;
        Ok(bucket.with_path_style())
    }
}

#[async_trait::async_trait]
impl Remote for S3Remote {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn create_bucket(&self) -> Result<Arc<dyn Bucket>> {
        let name = bucket_name(&self.config.bucket_prefix);
        let response = S3Bucket::create_with_path_style(
            &name,
            self.region(),
            self.credentials()?,
            BucketConfiguration::default(),
        )
        .await?;

        if !response.success() {
            return Err(Error::Status {
                status: response.response_code,
                path: name,
            });
        }

        tracing::debug!(bucket = %name, "created bucket");
        Ok(Arc::new(S3CompatibleBucket {
            name,
            bucket: response.bucket,
        }))
    }

    #[tracing::instrument(level = "debug", fields(bucket = bucket.name()), skip_all)]
    async fn teardown(&self, bucket: &dyn Bucket) -> Result<()> {
        let bucket = self.open(bucket.name())?;

        let listing = match bucket.list(String::new(), None).await {
            Ok(listing) => listing,
            Err(err) if is_not_found(&err) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        for object in listing.iter().flat_map(|page| &page.contents) {
            match bucket.delete_object(&object.key).await {
                Ok(_) => {}
                Err(err) if is_not_found(&err) => {}
                Err(err) => return Err(err.into()),
            }
        }

        match bucket.delete().await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn is_not_found(err: &S3Error) -> bool {
    matches!(err, S3Error::HttpFailWithBody(404, _))
}

fn check_status(status: u16, path: &str) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(Error::Status {
            status,
            path: path.to_owned(),
        })
    }
}

struct S3CompatibleBucket {
    name: String,
    bucket: Box<S3Bucket>,
}

impl fmt::Debug for S3CompatibleBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleBucket")
            .field("name", &self.name)
            .field("endpoint", &self.bucket.host())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Bucket for S3CompatibleBucket {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn list_keys(&self) -> Result<Vec<String>> {
        let listing = self.bucket.list(String::new(), None).await?;
        Ok(listing
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect())
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn put(&self, key: &str, payload: Bytes) -> Result<()> {
        let response = self.bucket.put_object(key, &payload).await?;
        check_status(response.status_code(), key)
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn get(&self, key: &str, mut sink: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        let status = self.bucket.get_object_to_writer(key, &mut sink).await?;
        check_status(status, key)
    }
}
