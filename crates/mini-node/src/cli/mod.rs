//! # Command Line
//!
//! `minid [--home] [--log-level] [--log-format] <command>`
//!
//! Flags become the last configuration layer; the command path decides
//! between client and server mode before anything is resolved.

mod commands;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use mini_telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use serde_json::Value;

use crate::bootstrap::bootstrap;
use crate::config::{self, keys};
use crate::dispatch::CommandId;

#[derive(Debug, Parser)]
#[command(name = "minid", version, about = "Mini-Chain node daemon")]
pub struct Cli {
    /// Node home directory
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Log level (`info`, or consensus style `*:error,p2p:info`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format: plain or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Initialize the node home: genesis, client.toml and app.toml
    Init {
        moniker: String,
        #[arg(long)]
        chain_id: Option<String>,
        /// Replace an existing genesis file
        #[arg(long)]
        overwrite: bool,
    },

    /// Run the node until interrupted
    Start(StartArgs),

    /// Genesis file utilities
    Genesis {
        #[command(subcommand)]
        command: GenesisCommand,
    },

    /// Query a running node
    Query {
        #[command(subcommand)]
        command: QueryCommand,
    },

    /// Offline transaction utilities
    Tx {
        #[command(subcommand)]
        command: TxCommand,
    },

    /// Configuration utilities
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Print the version
    Version,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    #[arg(long)]
    pub minimum_gas_prices: Option<String>,
    #[arg(long)]
    pub grpc_address: Option<String>,
    #[arg(long)]
    pub gateway_address: Option<String>,
    #[arg(long)]
    pub rest_address: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum GenesisCommand {
    /// Export the current state as a genesis document
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a genesis file (defaults to the home genesis)
    Validate { path: Option<PathBuf> },
}

#[derive(Debug, Subcommand)]
pub enum QueryCommand {
    LatestBlock,
    NodeInfo,
    /// List modules with their query methods and messages
    Modules,
    /// State of one module
    Module {
        name: String,
        #[arg(long)]
        height: Option<u64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum TxCommand {
    /// Encode a JSON transaction file to hex
    Encode { file: PathBuf },
    /// Decode a hex transaction to JSON
    Decode { hex: String },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    View,
}

impl Cli {
    pub fn command_id(&self) -> CommandId {
        let path: Vec<&str> = match &self.command {
            Command::Init { .. } => vec!["init"],
            Command::Start(_) => vec!["start"],
            Command::Genesis { command } => match command {
                GenesisCommand::Export { .. } => vec!["genesis", "export"],
                GenesisCommand::Validate { .. } => vec!["genesis", "validate"],
            },
            Command::Query { command } => match command {
                QueryCommand::LatestBlock => vec!["query", "latest-block"],
                QueryCommand::NodeInfo => vec!["query", "node-info"],
                QueryCommand::Modules => vec!["query", "modules"],
                QueryCommand::Module { .. } => vec!["query", "module"],
            },
            Command::Tx { command } => match command {
                TxCommand::Encode { .. } => vec!["tx", "encode"],
                TxCommand::Decode { .. } => vec!["tx", "decode"],
            },
            Command::Config { .. } => vec!["config", "view"],
            Command::Version => vec!["version"],
        };
        CommandId::new(path)
    }

    /// Flags that were given, as configuration keys.
    pub fn flags(&self) -> BTreeMap<String, Value> {
        let mut flags = BTreeMap::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                flags.insert(key.to_string(), Value::from(value));
            }
        };
        set(keys::HOME, self.home.as_ref().map(|h| h.display().to_string()));
        set(keys::LOG_LEVEL, self.log_level.clone());
        set(keys::LOG_FORMAT, self.log_format.clone());

        match &self.command {
            Command::Init {
                moniker, chain_id, ..
            } => {
                set(keys::COMET_MONIKER, Some(moniker.clone()));
                set(keys::CHAIN_ID, chain_id.clone());
            }
            Command::Start(args) => {
                set(keys::MINIMUM_GAS_PRICES, args.minimum_gas_prices.clone());
                set(keys::GRPC_ADDRESS, args.grpc_address.clone());
                set(keys::GATEWAY_ADDRESS, args.gateway_address.clone());
                set(keys::REST_ADDRESS, args.rest_address.clone());
            }
            _ => {}
        }
        flags
    }
}

/// Load configuration, install telemetry, bootstrap and execute.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load(cli.flags())?;

    let log_format = config.get_str(keys::LOG_FORMAT)?;
    let telemetry = TelemetryConfig::from_env()
        .with_log_level(config.get_str(keys::LOG_LEVEL)?)
        .with_log_format(
            LogFormat::parse(&log_format)
                .with_context(|| format!("unknown log format {log_format:?}"))?,
        );
    let _telemetry = init_telemetry(telemetry)?;

    let command = cli.command_id();
    let deps = bootstrap(&command, config.clone())?;
    commands::execute(cli.command, deps, &config).await
}
