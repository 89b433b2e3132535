use crate::demo::{run_demo, run_settle, DemoArgs, SettleArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use payout_engine::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Payout Engine",
    about = "Run the worker payout settlement engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print settlement breakdowns computed from exported CSV snapshots
    Settle(SettleArgs),
    /// Walk through advance approval, settlement and payout with in-memory data
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Directory with services.csv, purchases.csv and fines.csv to serve as source feeds
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Settle(args) => run_settle(args),
        Command::Demo(args) => run_demo(args),
    }
}
