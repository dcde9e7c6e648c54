//! Serialization of the result stream.

use std::io::Write;

use anyhow::{Context, Result, bail};

use crate::record::{Message, Record, ResultReceiver};

/// Writes one record as a standalone YAML document.
pub fn write_record<W: Write>(mut out: W, record: &Record) -> Result<()> {
    out.write_all(b"---\n")?;
    serde_yaml::to_writer(&mut out, record).context("failed to serialize record")?;
    Ok(())
}

/// Drains the result stream into `out` until the end-of-stream marker arrives.
///
/// Returns the number of records written. Fails if all producers disappear
/// without terminating the stream.
pub async fn drain<W: Write>(mut results: ResultReceiver, mut out: W) -> Result<usize> {
    let mut count = 0;

    while let Some(message) = results.recv().await {
        match message {
            Message::Record(record) => {
                write_record(&mut out, &record)?;
                count += 1;
            }
            Message::EndOfStream => {
                out.flush()?;
                return Ok(count);
            }
        }
    }

    out.flush()?;
    bail!("result stream closed without an end-of-stream marker")
}
