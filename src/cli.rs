//! Command-line interface: `jobctl submit|status|plan`.
//!
//! The CLI runs a single-process [`crate::tracker::Tracker`] for the
//! lifetime of the command. This is intended for local testing and
//! demonstration; a cluster deployment drives the tracker as an embedded
//! library behind its own network-facing collaborators instead.

use crate::app::{initialize_app, AppConfig};
use crate::collab::DefaultJobFactory;
use crate::tracker::{JobId, JobInfo};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "jobctl", about = "Drive a local MapReduce job tracker node")]
pub struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a job and wait for it to finish.
    Submit {
        /// Input paths, one split per path.
        #[arg(required = true)]
        inputs: Vec<String>,
        #[arg(long)]
        output: String,
        #[arg(long, default_value_t = 0)]
        reducers: usize,
        /// Registered job name the embedded `DefaultJobFactory` resolves.
        #[arg(long)]
        job_name: String,
        #[arg(long)]
        combiner: bool,
        /// Seconds to wait for completion before giving up.
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Print the assigned plan for a previously submitted job.
    Plan {
        #[arg(long)]
        cluster_tag: String,
        #[arg(long)]
        sequence: u64,
    },
    /// Print whether a previously submitted job has finished yet.
    Status {
        #[arg(long)]
        cluster_tag: String,
        #[arg(long)]
        sequence: u64,
    },
}

pub async fn execute_command(command: Commands, verbose: u8) -> Result<()> {
    let config = AppConfig::new(verbose)?;

    // A demo job factory that resolves to an opaque pass-through job under
    // whatever name the caller submits: this CLI has no mapper/reducer
    // implementations of its own to link in, only the tracker's
    // bookkeeping around them. An embedding binary supplies a factory
    // pre-populated with real jobs instead of going through this path.
    let factory = Arc::new(DefaultJobFactory::new());
    if let Commands::Submit { ref job_name, .. } = command {
        factory.register(job_name.clone()).await;
    }
    let tracker = initialize_app(config, factory).await?;

    match command {
        Commands::Submit {
            inputs,
            output,
            reducers,
            job_name,
            combiner,
            timeout_secs,
        } => {
            let mut info = JobInfo::new(inputs, output, reducers).with_config("job_name", job_name);
            if combiner {
                info = info.with_config("combiner", "true");
            }
            let (job_id, handle) = tracker.api.submit(info).await?;
            info!(%job_id, "job submitted, awaiting completion");
            match tokio::time::timeout(Duration::from_secs(timeout_secs), handle.wait()).await {
                Ok(Ok(finished)) => println!("job {finished} completed successfully"),
                Ok(Err(cause)) => return Err(anyhow!("job {job_id} failed: {cause}")),
                Err(_) => return Err(anyhow!("timed out waiting for job {job_id}")),
            }
        }
        Commands::Plan {
            cluster_tag,
            sequence,
        } => {
            let job_id = JobId {
                cluster_tag,
                sequence,
            };
            let plan = tracker.api.plan(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Status {
            cluster_tag,
            sequence,
        } => {
            let job_id = JobId {
                cluster_tag,
                sequence,
            };
            let handle = tracker.api.status(&job_id).await?;
            match handle.now_or_never() {
                Some(Ok(finished)) => println!("job {finished}: COMPLETE (succeeded)"),
                Some(Err(cause)) => println!("job {job_id}: COMPLETE (failed: {cause})"),
                None => println!("job {job_id}: RUNNING"),
            }
        }
    }

    tracker.shutdown().await;
    Ok(())
}
