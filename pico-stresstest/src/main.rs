//! This is a stresstest binary which runs a randomized workload against a container orchestration
//! API.
//!
//! The workload creates a batch of containers and can then restart, stop, start or fetch logs of
//! random samples of that batch, and finally delete it. Every operation is printed to stdout as
//! soon as it finishes, followed by a summary of all phases.
//!
//! Pressing Ctrl-C stops issuing new operations. Operations in flight are awaited and the summary
//! is still printed.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use anyhow::Context;
use pico_stresstest::http::HttpRemote;
use pico_stresstest::report::Reporter;
use tokio_util::sync::CancellationToken;

use crate::cli::Args;

mod cli;
mod observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    observability::initialize_tracing();

    let workload = args.workload().context("invalid workload")?;
    let remote = HttpRemote::for_address(&args.address, args.timeout)
        .context("failed to create HTTP client")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("cancelling, waiting for operations in flight");
                cancel.cancel();
            }
        }
    });

    let summary = pico_stresstest::run(remote, workload, Reporter::stdout(), cancel).await?;

    if summary.cancelled {
        anyhow::bail!("run cancelled");
    }
    let aborted = summary.aborted().count();
    if aborted > 0 {
        anyhow::bail!("{aborted} phase(s) aborted");
    }

    Ok(())
}
