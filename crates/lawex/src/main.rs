//! lawex: incremental Log Analytics export
//!
//! One-shot job, typically run on a schedule. Each run exports every due
//! query of the catalog to its blob container and advances the query's
//! checkpoint, then exits. The exit status is non-zero when any query failed.

use clap::Parser;
use miette::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod config;
mod credentials;
mod error;
mod job;

use config::Config;
use error::JobError;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "lawex=info,lawex_scheduler=info,lawex_azure=info".to_string()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    let summary = job::run(&config).await?;

    for report in &summary.reports {
        if let lawex_scheduler::QueryOutcome::Failed { error } = &report.outcome {
            error!(query = %report.query, destination = %report.destination, error = %error, "query failed");
        }
    }

    if summary.has_failures() {
        return Err(JobError::QueriesFailed {
            failed: summary.failed(),
            total: summary.reports.len(),
        }
        .into());
    }

    info!(
        exported = summary.exported(),
        skipped = summary.skipped(),
        no_data = summary.no_data(),
        "export job completed"
    );
    Ok(())
}
