mod action;
mod bot;
mod config;
mod gate;
mod transport;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::action::ActionRegistry;
use crate::bot::BotRuntime;
use crate::config::Config;
use crate::gate::InvocationGate;
use crate::transport::{Connection, ConsoleTransport, Transport};

const DEFAULT_CONFIG_PATH: &str = "config/chatops.toml";

fn print_help() {
    println!(
        "\
chatops-agent v{}

Trigger whitelisted shell commands from a chat interface.

USAGE:
    chatops-agent [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: {DEFAULT_CONFIG_PATH}]
                   A starter file is written there if it does not exist.

OPTIONS:
    -h, --help          Print this help message and exit
    -V, --version       Print version and exit
        --print-config  Print the loaded configuration and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the [chat] and [console] sections via
    ${{VAR_NAME}} syntax. Action definitions are used verbatim.

    RUST_LOG    Log level filter for tracing
                (e.g. debug, chatops_agent=debug,warn)

EXAMPLES:
    chatops-agent                            # uses {DEFAULT_CONFIG_PATH}
    chatops-agent /etc/chatops/actions.toml  # custom config path
    RUST_LOG=debug chatops-agent             # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut print_config = false;

    // Handle flags before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("chatops-agent v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--print-config" => print_config = true,
            path => config_path = path.to_string(),
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chatops_agent=info")),
        )
        .init();

    // No config yet: write a starter one and let the operator edit it
    if !Path::new(&config_path).exists() {
        Config::sample().write(&config_path)?;
        warn!("{config_path} not present. One was just created for you. Please edit it accordingly");
        return Ok(());
    }

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)?;

    if print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("Bot: {}", config.chat.name);
    match config.chat.channel {
        Some(ref channel) => info!("Only listening on channel {channel}"),
        None => info!("Listening on every channel"),
    }

    // Malformed actions are refused here, before any chat traffic
    let (registry, rejected) = ActionRegistry::from_definitions(config.actions.clone());
    if !rejected.is_empty() {
        error!(
            "{} action(s) refused, fix them in {config_path}",
            rejected.len()
        );
    }
    if registry.is_empty() {
        warn!("No usable actions configured");
    }
    info!("Actions: {} registered", registry.len());

    let gate = Arc::new(InvocationGate::new());
    let runtime = BotRuntime::new(config.chat.clone(), registry, gate);

    let transport: Box<dyn Transport> = Box::new(ConsoleTransport::new(config.console.user.clone()));
    info!(
        "Transport: {} (as {})",
        transport.name(),
        config.console.user
    );
    let Connection {
        event_rx,
        cmd_tx,
        outbound,
    } = transport.connect().await?;

    tokio::select! {
        result = runtime.run(event_rx, cmd_tx) => {
            if let Err(e) = result {
                error!("Runtime error: {e}");
                return Err(e);
            }
            // The runtime dropped its sender: flush what is left to say
            let _ = outbound.await;
            info!("Bot stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
            // A pending stdin read cannot be cancelled and would hold the
            // runtime shutdown until the next line
            std::process::exit(0);
        }
    }

    Ok(())
}
