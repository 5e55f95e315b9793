use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    AnalysisCommand, ConfigCommand, LedgerCommand, ProductCommand, Session, ToolCommand,
};
use trafego::config::Config;

#[derive(Parser)]
#[command(name = "trafego")]
#[command(version)]
#[command(about = "Paid traffic calculators, daily ledger and campaign analysis", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show, edit and follow calculator inputs
    Tool(ToolCommand),

    /// Manage products
    Product(ProductCommand),

    /// Daily investment, revenue and sales per product
    Ledger(LedgerCommand),

    /// AI campaign analysis and saved history
    Analysis(AnalysisCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trafego=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Tool(cmd)) => {
            let session = Session::open(&config).await?;
            cmd.run(&session).await?;
        }
        Some(Commands::Product(cmd)) => {
            let session = Session::open(&config).await?;
            cmd.run(&session).await?;
        }
        Some(Commands::Ledger(cmd)) => {
            let session = Session::open(&config).await?;
            cmd.run(&session).await?;
        }
        Some(Commands::Analysis(cmd)) => {
            let session = Session::open(&config).await?;
            cmd.run(&session).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
