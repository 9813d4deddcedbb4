use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Command-line arguments for `dispatcher-server`.
#[derive(Parser, Debug)]
#[command(
    name = "dispatcher-server",
    version,
    about = "Hands out lines of an input file to remote workers and persists \
             their results in input order"
)]
pub struct Args {
    /// Line-oriented input file; each line is one opaque work item.
    #[arg(long)]
    pub infile: PathBuf,

    /// Output file; line n receives the result for input line n.
    #[arg(long)]
    pub outfile: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Seconds before an unacknowledged issuance is re-queued.
    #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
    pub work_timeout: u64,

    /// Timed-out issuances tolerated before a line is written as a tombstone.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Retry hint (seconds) returned to workers when no work is issuable yet.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub retry_backoff: u64,

    /// Seconds to keep serving after all work completes, so late workers
    /// receive a clean end-of-work response instead of a refused connection.
    #[arg(long, default_value_t = 3)]
    pub grace: u64,
}

/// Runtime configuration, derived from [`Args`].
#[derive(Debug, Clone)]
pub struct Config {
    pub infile: PathBuf,
    pub outfile: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub work_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub grace: Duration,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            infile: args.infile,
            outfile: args.outfile,
            host: args.host,
            port: args.port,
            work_timeout: Duration::from_secs(args.work_timeout),
            max_retries: args.max_retries,
            retry_backoff: Duration::from_secs(args.retry_backoff),
            grace: Duration::from_secs(args.grace),
        }
    }
}

impl Config {
    /// A configuration with the documented defaults, pointed at the given
    /// files. Primarily for tests and embedding.
    pub fn with_files(infile: PathBuf, outfile: PathBuf) -> Self {
        Self {
            infile,
            outfile,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8000,
            work_timeout: Duration::from_secs(600),
            max_retries: 3,
            retry_backoff: Duration::from_secs(30),
            grace: Duration::from_secs(3),
        }
    }
}
