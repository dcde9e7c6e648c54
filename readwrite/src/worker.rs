//! The reader and writer loops.
//!
//! Each worker runs until its [`CancellationToken`] fires and emits exactly one
//! [`Record`] per operation. Storage calls are raced against the token with a
//! `biased` select, so cancellation always wins and simply drops the in-flight
//! call: it never shows up as a failed operation.
//!
//! The clock is stopped as soon as a call returns. Error formatting happens
//! afterwards and never inflates the measured duration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio_util::sync::CancellationToken;

use crate::generate::{FileGenerator, NameGenerator};
use crate::record::{ErrorInfo, Message, OpType, Record, ResultSender, Timer, Timing};
use crate::remote::Bucket;
use crate::verify::FileVerifier;

/// Everything a writer needs besides its generators.
#[derive(Debug)]
pub struct Writer {
    /// The bucket to upload to.
    pub bucket: Arc<dyn Bucket>,
    /// Index of this writer among all writers.
    pub worker: usize,
    /// Where to send the result records.
    pub results: ResultSender,
    /// Contents of the uploaded objects.
    pub files: FileGenerator,
    /// Keys of the uploaded objects.
    pub names: NameGenerator,
}

/// Everything a reader needs.
#[derive(Debug)]
pub struct Reader {
    /// The bucket to download from.
    pub bucket: Arc<dyn Bucket>,
    /// Index of this reader among all readers.
    pub worker: usize,
    /// Where to send the result records.
    pub results: ResultSender,
    /// How long to wait before listing an empty bucket again.
    pub idle_interval: Duration,
}

fn emit(results: &ResultSender, record: Record) -> Result<()> {
    results
        .send(Message::Record(record))
        .map_err(|_| anyhow!("result channel closed"))
}

impl Writer {
    /// Uploads synthetic files until cancelled.
    ///
    /// Returns an error only on a fatal fault, never for failed uploads.
    pub async fn run(mut self, token: CancellationToken) -> Result<()> {
        loop {
            let file = self.files.generate();
            let key = self.names.generate();

            let timer = Timer::start();
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                result = self.bucket.put(&key, file.into_bytes()) => result,
            };
            let Timing { start, duration } = timer.stop();

            let error = match result {
                Ok(()) => None,
                Err(err) => {
                    let error = ErrorInfo::from_error(err);
                    // a persistent failure must not starve the other workers
                    tokio::task::yield_now().await;
                    Some(error)
                }
            };

            emit(
                &self.results,
                Record {
                    op: OpType::Write,
                    bucket: self.bucket.name().to_owned(),
                    key,
                    worker: self.worker,
                    start,
                    duration,
                    error,
                },
            )?;
        }
    }
}

impl Reader {
    /// Downloads and verifies every key in the bucket, over and over, until cancelled.
    ///
    /// Keys are re-listed on every pass. There is no cursor, so the same objects
    /// are read repeatedly.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        loop {
            let listing = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                listing = self.bucket.list_keys() => listing,
            };

            let keys = listing.unwrap_or_else(|err| {
                tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    worker = self.worker,
                    "failed to list bucket"
                );
                Vec::new()
            });

            if keys.is_empty() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(self.idle_interval) => continue,
                }
            }

            for key in keys {
                let mut verifier = FileVerifier::new();

                let timer = Timer::start();
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(()),
                    result = self.bucket.get(&key, &mut verifier) => result,
                };
                let Timing { start, duration } = timer.stop();

                let error = match result {
                    Ok(()) if verifier.valid() => None,
                    Ok(()) => Some(ErrorInfo::verification_failed()),
                    Err(err) => {
                        let error = ErrorInfo::from_error(err);
                        tokio::task::yield_now().await;
                        Some(error)
                    }
                };

                emit(
                    &self.results,
                    Record {
                        op: OpType::Read,
                        bucket: self.bucket.name().to_owned(),
                        key,
                        worker: self.worker,
                        start,
                        duration,
                        error,
                    },
                )?;
            }
        }
    }
}
