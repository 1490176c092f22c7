//! batchgate - dynamic request-batching inference gateway
//!
//! Accepts individual inference requests over HTTP and serves them through
//! a batched, concurrency-bounded downstream backend.

use batchgate::{Config, Gateway};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Environment first so RUST_LOG and batching knobs from .env apply
    dotenvy::dotenv().ok();

    // Initialize logging system
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> batchgate::Result<()> {
    let config = Config::from_env()?;
    let gateway = Gateway::new(config)?;
    gateway.run().await
}
