//! # HTTP latency measurement
//!
//! `latency-test` fires a fixed number of GET requests at one URL from a bounded pool of
//! workers, then boils the timings down to mean/min/max/standard deviation, success rate and
//! throughput. The interesting part is `dispatch.rs` (the worker pool) and `stats.rs` (the
//! reduction); everything else is plumbing for the command line.
//!
//! ## Examples
//!
//! ```no_run
//! use latency_test::{self, Cancel, ConfigBuilder, Progress};
//!
//! let config = ConfigBuilder::new("https://www.example.com")
//!     .attempts(50)
//!     .workers(5)
//!     .build();
//!
//! let summary = latency_test::measure(&config, &Cancel::new(), &mut Progress::hidden())?;
//! println!("{}", latency_test::report::render_text(&config.target, &summary));
//! # Ok::<(), latency_test::Error>(())
//! ```
//!
pub mod config;
pub mod dispatch;
pub mod error;
pub mod progress;
pub mod report;
pub mod server;
pub mod stats;
pub mod url;

pub use config::{Config, ConfigBuilder, FileConfig, SuccessPolicy};
pub use dispatch::{dispatch, Cancel, Failure, HttpTransport, Outcome, Transport};
pub use error::{Error, Result};
pub use progress::Progress;
pub use stats::{Latency, Summary};

use std::path::Path;

use log::{info, LevelFilter};

/// Logs go to stderr (stdout carries the report) and, optionally, to a file.
pub fn setup_logger(log_level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let mut logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr());

    if let Some(path) = log_file {
        logger = logger.chain(fern::log_file(path)?);
    }

    logger.apply()?;

    Ok(())
}

/// Validates `config`, runs every attempt over HTTP and summarises the result.
pub fn measure(config: &Config, cancel: &Cancel, progress: &mut Progress) -> Result<Summary> {
    config.validate()?;

    let run = dispatch(config, || HttpTransport::new(config), cancel, |outcome| {
        progress.observe(outcome)
    })?;
    progress.finish();

    let summary = Summary::from(&run);
    info!(
        "{}/{} attempts succeeded in {:?}",
        summary.succeeded, summary.total, summary.wall
    );

    Ok(summary)
}
