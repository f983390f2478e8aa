//! Chat Gateway - path-routing API gateway for the user and chatbot services

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chat_gateway::config::Config;
use chat_gateway::error::Result;
use chat_gateway::proxy::GatewayServer;
use chat_gateway::routes::RouteTable;

/// Chat Gateway - routes, rewrites and streams requests to backend services
#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "API gateway with prefix routing and live response streaming")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the gateway (default command)
    #[command(name = "serve")]
    Serve,

    /// Print the resolved route table and exit
    #[command(name = "routes")]
    Routes,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None | Some(Command::Serve) => serve(&config).await,
        Some(Command::Routes) => print_routes(&config),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chat_gateway=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = Config::load(path)?.with_env()?;
    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);
    Ok(config)
}

async fn serve(config: &Config) -> Result<()> {
    tracing::info!("Starting chat gateway");
    let server = GatewayServer::new(config)?;
    server.serve().await
}

fn print_routes(config: &Config) -> Result<()> {
    let table = RouteTable::from_services(&config.services)?;
    for rule in table.rules() {
        println!(
            "{:<16} -> {}{}",
            rule.prefix(),
            rule.target().as_str().trim_end_matches('/'),
            rule.replacement()
        );
    }
    Ok(())
}
