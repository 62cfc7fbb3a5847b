//! CLI entry point for the tox client.
//!
//! Runs a client against the in-process loopback engine and manages
//! configuration files.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;
use tokio::signal;
use tox_client::{
    utils::{ClientConfig, DEFAULT_CONFIG_FILE},
    BootstrapTarget, Client, LoopbackEngine,
};

/// Tox client - lifecycle manager for an encrypted P2P messaging engine
#[derive(Parser)]
#[command(name = "tox-client")]
#[command(about = "Bootstrap, tick and shut down a P2P messaging engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the client until Ctrl-C
    Run {
        /// Bootstrap node as address:port:public_key (repeatable)
        #[arg(short, long)]
        bootstrap: Vec<BootstrapTarget>,
        /// Tick interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,
        /// Message to send to ourselves once running (repeatable)
        #[arg(short, long)]
        echo: Vec<String>,
    },
    /// Generate and validate configuration files
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        file: Option<PathBuf>,
    },
    /// Show current configuration
    Show {
        /// Output format (toml, json)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ClientConfig::load(cli.config.as_deref())?;
    setup_logging(cli.verbose, cli.quiet, &config.logging.level);

    match cli.command {
        Commands::Run {
            bootstrap,
            interval_ms,
            echo,
        } => handle_run_command(bootstrap, interval_ms, echo, config).await,
        Commands::Config { action } => handle_config_commands(action, &config),
    }
}

fn setup_logging(verbose: u8, quiet: bool, configured: &str) {
    let log_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => configured,
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();
}

async fn handle_run_command(
    bootstrap: Vec<BootstrapTarget>,
    interval_ms: Option<u64>,
    echo: Vec<String>,
    mut config: ClientConfig,
) -> Result<()> {
    // Override config with command line options
    if !bootstrap.is_empty() {
        config.client.bootstrap_nodes = bootstrap;
    }
    if interval_ms.is_some() {
        config.client.tick_interval_ms = interval_ms;
    }

    info!("Starting tox client...");
    info!("Bootstrap nodes: {}", config.client.bootstrap_nodes.len());

    let client = Client::new::<LoopbackEngine>(config).await?;
    client.register_message_handler(|peer, text| {
        println!("[{}] {}", peer, text);
    });

    if let Err(e) = run_until_interrupted(&client, &echo).await {
        error!("Client error: {}", e);
        client.shutdown().await?;
        return Err(e);
    }

    info!("Shutting down gracefully...");
    client.shutdown().await?;

    let stats = client.event_loop_stats().await;
    info!(
        "Ran {} tick(s), delivered {} message(s)",
        stats.ticks,
        client.dispatch_stats().delivered
    );
    Ok(())
}

async fn run_until_interrupted(client: &Client, echo: &[String]) -> Result<()> {
    if client.config().client.bootstrap_nodes.is_empty() {
        warn!("No bootstrap nodes configured; running offline");
    } else {
        client.bootstrap_configured().await?;
    }

    client.start_default().await?;

    for text in echo {
        if let Err(e) = client.send_message(tox_client::engine::loopback::SELF_PEER, text).await {
            warn!("{}", e);
        }
    }

    signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}

fn handle_config_commands(action: ConfigCommands, config: &ClientConfig) -> Result<()> {
    match action {
        ConfigCommands::Generate { output } => {
            let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

            ClientConfig::default().save(&output_path)?;
            println!("✓ Configuration generated: {}", output_path.display());
        }
        ConfigCommands::Validate { file } => {
            let config_to_validate = if let Some(path) = file {
                ClientConfig::from_file(path)?
            } else {
                config.clone()
            };

            config_to_validate.validate()?;
            println!("✓ Configuration is valid");
        }
        ConfigCommands::Show { format } => match format.as_str() {
            "toml" => println!("{}", config.to_toml_string()?),
            "json" => println!("{}", serde_json::to_string_pretty(config)?),
            _ => return Err(anyhow::anyhow!("Unsupported format: {}", format)),
        },
    }
    Ok(())
}
