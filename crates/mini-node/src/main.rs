//! # minid
//!
//! Mini-Chain node daemon. See the `mini_node` library for the bootstrap
//! and composition core.

use clap::Parser;

use mini_node::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run(Cli::parse()).await
}
