//! `agentos-policy` binary entrypoint.
//!
//! Loads configuration from environment variables and starts the HTTP server.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use anyhow::Result;

use agentos_core::observability::{LogFormat, init_logging};
use agentos_policy::{PolicyConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let config = PolicyConfig::from_env()?;
    config.validate()?;

    init_logging(LogFormat::for_profile(config.profile));

    let server = Server::new(config);
    server.serve().await?;
    Ok(())
}
