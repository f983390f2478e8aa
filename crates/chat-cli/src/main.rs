use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use chat_cli::commands::{
    ChatCommand, CliContext, LoginCommand, LogoutCommand, MeCommand, RegisterCommand,
};
use chat_cli::error::CliResult;
use chat_cli::output::OutputFormat;
use chat_cli::session::SessionStore;
use chat_gateway::client::GatewayClient;

#[derive(Parser)]
#[command(name = "chat-cli")]
#[command(about = "Chat CLI - Terminal client for the chat gateway")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(
        long,
        short = 'g',
        global = true,
        env = "GATEWAY_URL",
        default_value = "http://localhost:3000",
        help = "Gateway base URL"
    )]
    pub gateway: Url,

    #[clap(long, global = true, help = "Path to session file")]
    pub session_file: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Create an account")]
    Register(RegisterCommand),

    #[clap(about = "Log in and store the session token")]
    Login(LoginCommand),

    #[clap(about = "Show the logged-in user")]
    Me(MeCommand),

    #[clap(about = "Forget the stored session")]
    Logout(LogoutCommand),

    #[clap(about = "Send a message and stream the reply")]
    Chat(ChatCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let session_file = cli
        .session_file
        .clone()
        .unwrap_or_else(SessionStore::default_path);

    let ctx = CliContext::new(
        GatewayClient::new(cli.gateway.clone()),
        SessionStore::new(session_file),
        format,
    );

    match &cli.command {
        Command::Register(cmd) => cmd.execute(&ctx).await,
        Command::Login(cmd) => cmd.execute(&ctx).await,
        Command::Me(cmd) => cmd.execute(&ctx).await,
        Command::Logout(cmd) => cmd.execute(&ctx).await,
        Command::Chat(cmd) => cmd.execute(&ctx).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
