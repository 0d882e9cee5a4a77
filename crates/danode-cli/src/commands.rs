use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use danode_crypto::KeyPair;
use danode_node::{LocalChain, Node, NodeConfig, NodeDeps};
use danode_server::{NodeApiServer, ServerConfig};
use serde_json::json;
use tokio::sync::oneshot;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Keygen => cmd_keygen(&cli.format),
        Command::DefaultConfig(args) => cmd_default_config(args),
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let config = NodeConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate()?;
    let keys = KeyPair::from_hex(&config.signing_key)?;

    let chain = Arc::new(LocalChain::new(
        args.block_stale_measure,
        args.store_duration_blocks,
    ));
    for quorum in &config.quorum_ids {
        chain.set_stake(*quorum, keys.operator_id(), args.stake);
    }

    let enable_api = config.enable_node_api;
    let server_config = ServerConfig::from_node_config(&config);
    let node = Arc::new(Node::new(config, NodeDeps::local(chain, args.public_ip)).await?);
    node.start().await?;
    println!(
        "{} Node running as {}",
        "✓".green().bold(),
        node.operator_id().short_id().cyan()
    );

    let (api_stop, api_handle) = if enable_api {
        println!("  API: {}", server_config.bind_addr.to_string().bold());
        let (tx, rx) = oneshot::channel::<()>();
        let server = NodeApiServer::new(server_config, node.clone());
        let handle = tokio::spawn(server.serve(async {
            let _ = rx.await;
        }));
        (Some(tx), Some(handle))
    } else {
        (None, None)
    };

    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");

    if let Some(tx) = api_stop {
        let _ = tx.send(());
    }
    if let Some(handle) = api_handle {
        handle.await??;
    }
    node.shutdown().await;
    println!("{} Stopped.", "✓".green().bold());
    Ok(())
}

fn cmd_keygen(format: &OutputFormat) -> anyhow::Result<()> {
    let keys = KeyPair::generate();
    match format {
        OutputFormat::Text => {
            println!("{} Generated operator key", "✓".green().bold());
            println!("  Operator:   {}", keys.operator_id().to_hex().cyan());
            println!("  Public key: {}", keys.verifying_key().to_hex());
            println!("  Secret:     {}", keys.secret_hex().yellow());
        }
        OutputFormat::Json => {
            let out = json!({
                "operator_id": keys.operator_id().to_hex(),
                "public_key": keys.verifying_key().to_hex(),
                "signing_key": keys.secret_hex(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

fn default_config_toml() -> anyhow::Result<String> {
    let config = NodeConfig {
        signing_key: KeyPair::generate().secret_hex(),
        ..Default::default()
    };
    Ok(config.to_toml_string()?)
}

fn cmd_default_config(args: DefaultConfigArgs) -> anyhow::Result<()> {
    let text = default_config_toml()?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            println!("{} Wrote {}", "✓".green().bold(), path.display().to_string().bold());
        }
        None => print!("{text}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_loadable() {
        let text = default_config_toml().unwrap();
        let config = NodeConfig::from_toml_str(&text).unwrap();
        config.validate().unwrap();
        KeyPair::from_hex(&config.signing_key).unwrap();
    }

    #[test]
    fn default_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        cmd_default_config(DefaultConfigArgs {
            output: Some(path.clone()),
        })
        .unwrap();
        assert!(NodeConfig::load(&path).is_ok());
    }
}
