//! A load generator that runs concurrent readers and writers against a single
//! bucket of an object storage service.
//!
//! Writers upload synthetic files whose sizes follow a *Normal* distribution.
//! Every file ends in a checksum of its own content, so readers can verify
//! each download without knowing who wrote it. Readers repeatedly list the
//! bucket and download every key they find.
//!
//! Every operation produces one [`Record`] with its start time, duration and
//! outcome. Records from all workers are merged into one stream, which is
//! terminated by [`Message::EndOfStream`] once the run is over. Aggregating
//! the records is left to downstream tooling.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod generate;
pub mod harness;
pub mod observability;
pub mod output;
pub mod record;
pub mod remote;
pub mod verify;
pub mod worker;

#[cfg(test)]
mod testutils;

pub use crate::harness::{Harness, HarnessBuilder};
pub use crate::record::{Message, Record};
