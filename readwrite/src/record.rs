//! Result records and the channel that carries them from the workers to the consumer.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;

/// The message attached to reads whose content does not match its checksum.
pub const VERIFICATION_FAILED: &str = "content verification failed";

/// The kind of operation a [`Record`] measures.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum OpType {
    /// A download of an existing key.
    #[serde(rename = "r")]
    Read,
    /// An upload of a new synthetic file.
    #[serde(rename = "w")]
    Write,
}

/// The failure of a single operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorInfo {
    /// A human readable description of the failure.
    pub msg: String,
    /// The full cause chain, present for transport errors only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl ErrorInfo {
    /// Captures a failed storage call, including its chain of causes.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let error = anyhow::Error::new(error);
        Self {
            msg: error.to_string(),
            traceback: Some(format!("{error:?}")),
        }
    }

    /// A download that succeeded but whose content failed verification.
    pub fn verification_failed() -> Self {
        Self {
            msg: VERIFICATION_FAILED.to_owned(),
            traceback: None,
        }
    }
}

/// The measurement of one storage operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Record {
    /// Whether this was a read or a write.
    #[serde(rename = "type")]
    pub op: OpType,
    /// The bucket the operation ran against.
    pub bucket: String,
    /// The key that was read or written.
    pub key: String,
    /// The index of the worker within its role.
    pub worker: usize,
    /// Wall clock start of the operation, in seconds since the UNIX epoch.
    pub start: f64,
    /// Duration of the operation in nanoseconds.
    pub duration: u64,
    /// Present if the operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Record {
    /// Returns `true` if the operation completed without any error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Start time and duration of one measured operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    /// Seconds since the UNIX epoch.
    pub start: f64,
    /// Nanoseconds.
    pub duration: u64,
}

/// A running stopwatch for a single operation.
#[derive(Debug)]
pub struct Timer {
    wall: SystemTime,
    start: Instant,
}

impl Timer {
    /// Starts measuring.
    pub fn start() -> Self {
        Self {
            wall: SystemTime::now(),
            start: Instant::now(),
        }
    }

    /// Stops measuring. Call this before doing any work on the outcome.
    pub fn stop(self) -> Timing {
        let elapsed = self.start.elapsed();
        let start = self
            .wall
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |since| since.as_secs_f64());

        Timing {
            start,
            duration: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
        }
    }
}

/// An element of the result stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// A completed measurement.
    Record(Record),
    /// No further records follow. Sent exactly once, after all workers stopped.
    EndOfStream,
}

/// Producer half of the result stream, cloned into every worker.
pub type ResultSender = mpsc::UnboundedSender<Message>;
/// Consumer half of the result stream.
pub type ResultReceiver = mpsc::UnboundedReceiver<Message>;

/// Creates the unbounded result stream.
pub fn channel() -> (ResultSender, ResultReceiver) {
    mpsc::unbounded_channel()
}
