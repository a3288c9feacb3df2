//! Library root for `everyone-bot`.
//!
//! Everyone-bot lets members of a Telegram group ping everyone at once:
//! - Users opt in (`/in`) or out (`/out`) of being mentioned
//! - Anyone can mention all opted-in users (`/all`)
//! - Joins and leaves keep the list current, and admins can sweep it (`/clean`)
//! - Broadcast messages are deleted again once they are past retention
//!
//! The bot integrates with Telegram for chat and SurrealDB for storage. Both
//! sit behind traits so either can be swapped out or mocked.

pub mod base;
pub mod interaction;
pub mod reaper;
pub mod runtime;
pub mod service;

use anyhow::anyhow;
use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the everyone-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with database and chat clients
/// - Runs the event loop and the reaper until shutdown
pub async fn start(config: Config) -> Void {
    info!("Starting everyone-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install the crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
