//! Configuration of the storage service under test.
//!
//! Run parameters such as durations and worker counts come from the command
//! line. The remote is described in an optional YAML file:
//!
//! ```yaml
//! remote:
//!   type: s3
//!   endpoint: http://localhost:9000
//!   region: us-east-1
//!   access_key: minioadmin
//!   secret_key: minioadmin
//!   bucket_prefix: readwrite-
//!
//! idle_interval: 1s
//! ```
//!
//! Without a configuration file, the harness runs against an in-memory remote.
//! It keeps every uploaded object until the bucket is torn down, so memory grows
//! for the whole run and a warning is logged whenever it is selected.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::remote::{InMemoryRemote, Remote, S3Remote, S3RemoteConfig};

fn default_bucket_prefix() -> String {
    "readwrite-".to_owned()
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

/// Newtype around `String` that keeps secrets out of debug output.
#[derive(Clone, Default, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret in plain text.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[redacted]")
    }
}

/// The storage service to run against.
///
/// The `type` field determines which variant is used.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// A bucket in process memory (type `"memory"`).
    Memory {
        /// Prefix of generated bucket names.
        #[serde(default = "default_bucket_prefix")]
        bucket_prefix: String,
    },
    /// An S3-compatible service using path-style requests (type `"s3"`).
    S3 {
        /// Base URL of the service.
        endpoint: String,
        /// Region to sign requests for.
        #[serde(default = "default_region")]
        region: String,
        /// Access key ID.
        access_key: Option<String>,
        /// Secret access key.
        secret_key: Option<ConfigSecret>,
        /// Prefix of generated bucket names.
        #[serde(default = "default_bucket_prefix")]
        bucket_prefix: String,
    },
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::Memory {
            bucket_prefix: default_bucket_prefix(),
        }
    }
}

impl RemoteConfig {
    /// Instantiates the configured remote.
    pub fn build(&self) -> Arc<dyn Remote> {
        match self {
            Self::Memory { bucket_prefix } => {
                tracing::warn!(
                    "running against the in-memory remote, all uploads are kept in memory \
                     until the bucket is torn down"
                );
                Arc::new(InMemoryRemote::new(bucket_prefix.as_str()))
            }
            Self::S3 {
                endpoint,
                region,
                access_key,
                secret_key,
                bucket_prefix,
            } => Arc::new(S3Remote::new(S3RemoteConfig {
                endpoint: endpoint.clone(),
                region: region.clone(),
                access_key: access_key.clone(),
                secret_key: secret_key.as_ref().map(|s| s.as_str().to_owned()),
                bucket_prefix: bucket_prefix.clone(),
            })),
        }
    }
}

/// Contents of the configuration file.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The storage service under test.
    pub remote: RemoteConfig,

    /// How long readers wait before listing an empty bucket again.
    #[serde(with = "humantime_serde")]
    pub idle_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            idle_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Loads the configuration from a YAML file, or returns the defaults if no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let file = std::fs::File::open(path).context("failed to open config file")?;
        serde_yaml::from_reader(file).context("failed to parse config YAML")
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use super::*;

    /// Log output shared between a test and its subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn defaults_to_memory() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.idle_interval, Duration::from_secs(1));
        assert!(matches!(config.remote, RemoteConfig::Memory { .. }));
    }

    #[test]
    fn parses_s3_remote() {
        let yaml = r#"
            remote:
              type: s3
              endpoint: http://localhost:9000
              access_key: minio
              secret_key: hunter2
            idle_interval: 250ms
        "#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.idle_interval, Duration::from_millis(250));

        let RemoteConfig::S3 {
            endpoint,
            region,
            access_key,
            secret_key,
            bucket_prefix,
        } = &config.remote
        else {
            panic!("expected s3 remote, got {:?}", config.remote);
        };
        assert_eq!(endpoint, "http://localhost:9000");
        assert_eq!(region, "us-east-1");
        assert_eq!(access_key.as_deref(), Some("minio"));
        assert_eq!(secret_key.as_ref().unwrap().as_str(), "hunter2");
        assert_eq!(bucket_prefix, "readwrite-");

        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = serde_yaml::from_str("idle_interval: 2s").unwrap();
        assert_eq!(config.idle_interval, Duration::from_secs(2));
        assert_eq!(config.remote, RemoteConfig::default());
    }

    #[test]
    fn rejects_unknown_remote() {
        let result = serde_yaml::from_str::<Config>("remote:\n  type: ftp\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/readwrite.yml"))).unwrap_err();
        assert!(err.to_string().contains("failed to open config file"));
    }

    #[test]
    fn in_memory_remote_warns() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let config = Config::load(None).unwrap();
        tracing::subscriber::with_default(subscriber, || config.remote.build());

        let logs = captured.contents();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("in-memory remote"), "{logs}");
    }
}
