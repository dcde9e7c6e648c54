//! Run a population of readers and writers against a fresh bucket.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bytesize::ByteSize;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::generate;
use crate::record::{Message, ResultSender};
use crate::remote::{Bucket, Remote};
use crate::worker::{Reader, Writer};

/// Mean length of generated object names.
const NAME_MEAN: f64 = 15.0;
/// Standard deviation of generated object name lengths.
const NAME_STDDEV: f64 = 4.0;

/// A builder for creating a [`Harness`].
#[derive(Debug)]
pub struct HarnessBuilder {
    duration: Duration,
    num_readers: usize,
    num_writers: usize,
    file_size: u64,
    file_stddev: u64,
    rewrite: bool,
    cleanup: bool,
    idle_interval: Duration,
}

impl HarnessBuilder {
    /// How long workers run before they are cancelled.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// The number of concurrent reader workers.
    pub fn readers(mut self, readers: usize) -> Self {
        self.num_readers = readers;
        self
    }

    /// The number of concurrent writer workers.
    pub fn writers(mut self, writers: usize) -> Self {
        self.num_writers = writers;
        self
    }

    /// Normal distribution of file sizes in bytes for uploads.
    pub fn file_size(mut self, mean: u64, stddev: u64) -> Self {
        self.file_size = mean;
        self.file_stddev = stddev;
        self
    }

    /// Whether all writers share one name sequence, overwriting the same keys.
    pub fn rewrite(mut self, rewrite: bool) -> Self {
        self.rewrite = rewrite;
        self
    }

    /// Whether to delete the bucket at the end of the run.
    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// How long readers wait before listing an empty bucket again.
    pub fn idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    /// Creates the harness instance.
    pub fn build(self) -> Harness {
        Harness {
            duration: self.duration,
            num_readers: self.num_readers,
            num_writers: self.num_writers,
            file_size: self.file_size,
            file_stddev: self.file_stddev,
            rewrite: self.rewrite,
            cleanup: self.cleanup,
            idle_interval: self.idle_interval,
        }
    }
}

/// Configuration of a single load generation run.
#[derive(Clone, Debug)]
pub struct Harness {
    pub(crate) duration: Duration,
    pub(crate) num_readers: usize,
    pub(crate) num_writers: usize,
    pub(crate) file_size: u64,
    pub(crate) file_stddev: u64,
    pub(crate) rewrite: bool,
    pub(crate) cleanup: bool,
    pub(crate) idle_interval: Duration,
}

impl Harness {
    /// Constructs a new builder with the defaults of the command line.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            duration: Duration::from_secs(5),
            num_readers: 0,
            num_writers: 2,
            file_size: 1024 * 1024,
            file_stddev: 0,
            rewrite: false,
            cleanup: true,
            idle_interval: Duration::from_secs(1),
        }
    }

    /// Runs all workers against a new bucket on `remote` and streams their records into `results`.
    ///
    /// Once the bucket exists, [`Message::EndOfStream`] is sent exactly once, after every worker
    /// has stopped. This holds even if a worker fails. Unless cleanup is disabled, the bucket is
    /// torn down afterwards on every exit path.
    pub async fn run(&self, remote: &dyn Remote, results: ResultSender) -> Result<()> {
        let bucket = remote
            .create_bucket()
            .await
            .context("failed to create bucket")?;
        tracing::info!(bucket = bucket.name(), "created bucket");

        let outcome = self.run_workers(Arc::clone(&bucket), &results).await;
        results.send(Message::EndOfStream).ok();

        if !self.cleanup {
            tracing::info!(bucket = bucket.name(), "skipping cleanup");
            return outcome;
        }

        let teardown = remote.teardown(&*bucket).await;
        match (outcome, teardown) {
            (Ok(()), Ok(())) => {
                tracing::info!(bucket = bucket.name(), "deleted bucket");
                Ok(())
            }
            (Ok(()), Err(err)) => Err(err).context("failed to tear down bucket"),
            (Err(err), teardown) => {
                if let Err(teardown_err) = teardown {
                    tracing::error!(
                        error = &teardown_err as &dyn std::error::Error,
                        "failed to tear down bucket"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_workers(&self, bucket: Arc<dyn Bucket>, results: &ResultSender) -> Result<()> {
        let token = CancellationToken::new();
        let writers = self.writers(&bucket, results)?;

        tracing::info!(
            "Using file size: {} +- {}",
            ByteSize::b(self.file_size),
            ByteSize::b(self.file_stddev)
        );
        tracing::info!(
            "Spawning {} readers and {} writers...",
            self.num_readers,
            self.num_writers
        );

        let mut workers = JoinSet::new();
        for writer in writers {
            workers.spawn(writer.run(token.child_token()));
        }
        for worker in 0..self.num_readers {
            let reader = Reader {
                bucket: Arc::clone(&bucket),
                worker,
                results: results.clone(),
                idle_interval: self.idle_interval,
            };
            workers.spawn(reader.run(token.child_token()));
        }

        // Workers only ever return on cancellation. Anything that finishes earlier is a fault.
        let mut outcome = tokio::select! {
            _ = tokio::time::sleep(self.duration) => Ok(()),
            Some(joined) = workers.join_next() => {
                worker_outcome(joined).and_then(|()| Err(anyhow!("worker stopped before the deadline")))
            }
        };
        if outcome.is_err() {
            tracing::error!("aborting run after worker fault");
        }

        token.cancel();
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = worker_outcome(joined) {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        outcome
    }

    fn writers(&self, bucket: &Arc<dyn Bucket>, results: &ResultSender) -> Result<Vec<Writer>> {
        let name_seed = self.rewrite.then(rand::random::<u64>);

        (0..self.num_writers)
            .map(|worker| -> Result<Writer> {
                let file_seed = rand::random::<u64>();
                let files =
                    generate::files(self.file_size as f64, self.file_stddev as f64, file_seed)?;
                let names = generate::names(NAME_MEAN, NAME_STDDEV, name_seed.unwrap_or(file_seed))?;

                Ok(Writer {
                    bucket: Arc::clone(bucket),
                    worker,
                    results: results.clone(),
                    files,
                    names,
                })
            })
            .collect()
    }
}

fn worker_outcome(joined: Result<Result<()>, JoinError>) -> Result<()> {
    joined.context("worker panicked")?.context("worker failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{self, OpType, Record};
    use crate::remote::InMemoryRemote;
    use crate::testutils;

    fn drain(mut results: record::ResultReceiver) -> (Vec<Record>, usize) {
        let mut records = Vec::new();
        let mut end_of_stream = 0;
        while let Ok(message) = results.try_recv() {
            match message {
                Message::Record(record) => {
                    assert_eq!(end_of_stream, 0, "record after end of stream");
                    records.push(record);
                }
                Message::EndOfStream => end_of_stream += 1,
            }
        }
        (records, end_of_stream)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rewrite_mode_shares_names() {
        testutils::init_tracing();
        let remote = InMemoryRemote::default();
        let harness = Harness::builder()
            .duration(Duration::from_millis(300))
            .writers(4)
            .file_size(128, 0)
            .rewrite(true)
            .cleanup(false)
            .build();

        let (tx, rx) = record::channel();
        harness.run(&remote, tx).await.unwrap();
        let (records, end_of_stream) = drain(rx);
        assert_eq!(end_of_stream, 1);

        // every writer walks the same name sequence, so the busiest writer defines the key space
        let mut writes_per_worker = [0; 4];
        for record in &records {
            assert_eq!(record.op, OpType::Write);
            writes_per_worker[record.worker] += 1;
        }
        let bucket = remote.buckets().pop().unwrap();
        let keys = remote.keys(&bucket).unwrap();
        assert_eq!(keys.len(), writes_per_worker.into_iter().max().unwrap());
        assert!(writes_per_worker.iter().sum::<usize>() > keys.len());
    }

    #[tokio::test]
    async fn without_rewrite_writers_use_distinct_names() {
        let harness = Harness::builder().writers(3).file_size(16, 0).build();
        let remote = InMemoryRemote::default();
        let bucket = remote.create_bucket().await.unwrap();
        let (tx, _rx) = record::channel();

        let mut writers = harness.writers(&bucket, &tx).unwrap();
        let names: Vec<_> = writers.iter_mut().map(|w| w.names.generate()).collect();
        assert_ne!(names[0], names[1]);
        assert_ne!(names[1], names[2]);

        let harness = Harness::builder().writers(3).rewrite(true).build();
        let mut writers = harness.writers(&bucket, &tx).unwrap();
        let names: Vec<_> = writers.iter_mut().map(|w| w.names.generate()).collect();
        assert_eq!(names[0], names[1]);
        assert_eq!(names[1], names[2]);
    }

    #[tokio::test]
    async fn worker_ids_are_unique_per_role() {
        let harness = Harness::builder().writers(5).file_size(16, 0).build();
        let remote = InMemoryRemote::default();
        let bucket = remote.create_bucket().await.unwrap();
        let (tx, _rx) = record::channel();

        let writers = harness.writers(&bucket, &tx).unwrap();
        let ids: Vec<_> = writers.iter().map(|w| w.worker).collect();
        assert_eq!(ids, [0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn create_bucket_failure_is_reported() {
        #[derive(Debug)]
        struct Unavailable;

        #[async_trait::async_trait]
        impl Remote for Unavailable {
            async fn create_bucket(&self) -> crate::remote::Result<Arc<dyn Bucket>> {
                Err(crate::remote::Error::Injected("create_bucket"))
            }

            async fn teardown(&self, _bucket: &dyn Bucket) -> crate::remote::Result<()> {
                unreachable!("no bucket was created")
            }
        }

        let (tx, rx) = record::channel();
        let err = Harness::builder().build().run(&Unavailable, tx).await.unwrap_err();
        assert!(err.to_string().contains("failed to create bucket"));

        // the sender is gone, so consumers see the stream close
        let (records, end_of_stream) = drain(rx);
        assert!(records.is_empty());
        assert_eq!(end_of_stream, 0);
    }
}
