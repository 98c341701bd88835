//! Command handlers.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::{Command, ConfigCommand, GenesisCommand, QueryCommand, TxCommand};
use crate::app::genesis::{genesis_path, GenesisDoc};
use crate::app::Application;
use crate::bootstrap::{ClientDependencies, CommandDependencies};
use crate::client::{ClientConfig, ClientContext};
use crate::config::{app_toml_path, keys, render_toml, GlobalConfig};
use crate::node::NodeRuntime;
use crate::runtime::codec::Tx;

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(super) async fn execute(
    command: Command,
    deps: CommandDependencies,
    config: &GlobalConfig,
) -> Result<()> {
    match deps {
        CommandDependencies::Server { app, deps } => server(command, app, &deps, config).await,
        CommandDependencies::Client(deps) => client(command, &deps, config).await,
    }
}

async fn server(
    command: Command,
    app: Application,
    deps: &ClientDependencies,
    config: &GlobalConfig,
) -> Result<()> {
    if let Command::Start(_) = command {
        let node = NodeRuntime::start(app, config, &deps.client).await?;
        node.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
        })
        .await?;
        return Ok(());
    }

    let result = match command {
        Command::Init {
            moniker, overwrite, ..
        } => init(&app, &deps.client, config, &moniker, overwrite),
        Command::Genesis {
            command: GenesisCommand::Export { output },
        } => export_genesis(&app, &deps.client, output.as_deref()),
        Command::Genesis {
            command: GenesisCommand::Validate { path },
        } => {
            let path = path.unwrap_or_else(|| genesis_path(&deps.client.home));
            validate_genesis(&app, &path)
        }
        other => Err(anyhow::anyhow!("{other:?} does not run in server mode")),
    };
    let closed = app.close();
    result?;
    closed?;
    Ok(())
}

fn init(
    app: &Application,
    client: &ClientContext,
    config: &GlobalConfig,
    moniker: &str,
    overwrite: bool,
) -> Result<()> {
    let home = config.home()?;
    let genesis_file = genesis_path(&home);
    if genesis_file.exists() && !overwrite {
        bail!(
            "genesis file {} already exists, use --overwrite to replace it",
            genesis_file.display()
        );
    }
    let chain_id = config.get_str(keys::CHAIN_ID)?;
    GenesisDoc::new(&chain_id, app.module_manager().default_genesis()).write(&genesis_file)?;

    if !ClientConfig::path(&home).exists() {
        ClientConfig {
            chain_id: chain_id.clone(),
            ..ClientConfig::default()
        }
        .write(&home)?;
    }

    let app_toml = app_toml_path(&home);
    if !app_toml.exists() {
        let mut values = config.values().clone();
        values.remove(keys::HOME);
        std::fs::write(&app_toml, render_toml(&values)?)
            .with_context(|| format!("writing {}", app_toml.display()))?;
    }

    info!(%moniker, %chain_id, home = %home.display(), "node initialized");
    if client.chain_id != chain_id {
        warn!(client_chain_id = %client.chain_id, "client.toml names a different chain id");
    }
    print_json(&json!({
        "moniker": moniker,
        "chain_id": chain_id,
        "genesis": genesis_file.display().to_string(),
    }))
}

fn export_genesis(app: &Application, client: &ClientContext, output: Option<&Path>) -> Result<()> {
    let app_state = app.app_manager().export_genesis()?;
    let doc = GenesisDoc::new(&client.chain_id, app_state);
    match output {
        Some(path) => {
            doc.write(path)?;
            println!("genesis exported to {}", path.display());
            Ok(())
        }
        None => print_json(&doc),
    }
}

fn validate_genesis(app: &Application, path: &Path) -> Result<()> {
    let doc = GenesisDoc::read(path)?;
    doc.validate(app.module_manager())
        .with_context(|| format!("genesis file {} is invalid", path.display()))?;
    println!("File at {} is a valid genesis file", path.display());
    Ok(())
}

async fn client(command: Command, deps: &ClientDependencies, config: &GlobalConfig) -> Result<()> {
    match command {
        Command::Query { command } => query(command, deps).await,
        Command::Tx { command } => tx(command, &deps.client),
        Command::Config {
            command: ConfigCommand::View,
        } => {
            print!("{}", render_toml(config.values())?);
            Ok(())
        }
        Command::Version => {
            println!("minid {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => bail!("{other:?} does not run in client mode"),
    }
}

async fn query(command: QueryCommand, deps: &ClientDependencies) -> Result<()> {
    let path = match command {
        QueryCommand::Modules => return print_json(deps.autocli.as_ref()),
        QueryCommand::LatestBlock => "/cometbft/v1/blocks/latest".to_string(),
        QueryCommand::NodeInfo => "/cometbft/v1/node_info".to_string(),
        QueryCommand::Module { name, height } => {
            if deps.autocli.module(&name).is_none() {
                bail!("unknown module {name}");
            }
            match height {
                Some(height) => format!("/mini/{name}/v1/state?height={height}"),
                None => format!("/mini/{name}/v1/state"),
            }
        }
    };
    let node = deps.client.query_client()?;
    print_json(&node.get_json(&path).await?)
}

fn tx(command: TxCommand, client: &ClientContext) -> Result<()> {
    match command {
        TxCommand::Encode { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let tx: Tx = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", file.display()))?;
            println!("{}", hex::encode(client.tx_config.encode(&tx)?));
            Ok(())
        }
        TxCommand::Decode { hex: encoded } => {
            let bytes = hex::decode(encoded.trim()).context("transaction is not hex")?;
            print_json(&client.tx_config.decode(&bytes)?)
        }
    }
}
