//! Command line entry point of the read/write load generator.
//!
//! Result records are written to stdout as a stream of YAML documents. All
//! logs go to stderr.

use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use argh::FromArgs;

use readwrite::config::Config;
use readwrite::{Harness, observability, output, record};

/// Run concurrent readers and writers against a fresh bucket
#[derive(Debug, FromArgs)]
struct Args {
    /// duration to run tests, in seconds
    #[argh(option, short = 't', default = "5.0")]
    time: f64,

    /// number of reader workers
    #[argh(option, short = 'r', default = "0")]
    read: usize,

    /// number of writer workers
    #[argh(option, short = 'w', default = "2")]
    write: usize,

    /// mean file size to use, in KB
    #[argh(option, short = 's', default = "1024.0")]
    size: f64,

    /// standard deviation of the file size, in KB
    #[argh(option, short = 'd', default = "0.0")]
    stddev: f64,

    /// rewrite the same keys with every writer
    #[argh(switch, short = 'W')]
    rewrite: bool,

    /// skip cleaning up the created bucket
    #[argh(switch)]
    no_cleanup: bool,

    /// path to the YAML configuration file of the remote
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn kilobytes(kb: f64) -> anyhow::Result<u64> {
    anyhow::ensure!(kb.is_finite() && kb >= 0.0, "invalid size: {kb} KB");
    Ok((kb * 1024.0).round() as u64)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    observability::init_tracing();

    let config = Config::load(args.config.as_deref())?;
    let remote = config.remote.build();

    let harness = Harness::builder()
        .duration(Duration::try_from_secs_f64(args.time).context("invalid duration")?)
        .readers(args.read)
        .writers(args.write)
        .file_size(kilobytes(args.size)?, kilobytes(args.stddev)?)
        .rewrite(args.rewrite)
        .cleanup(!args.no_cleanup)
        .idle_interval(config.idle_interval)
        .build();

    let (tx, rx) = record::channel();
    let (run, drained) = tokio::join!(
        harness.run(remote.as_ref(), tx),
        output::drain(rx, BufWriter::new(io::stdout())),
    );

    run?;
    let count = drained?;
    tracing::info!("wrote {count} records");

    Ok(())
}
