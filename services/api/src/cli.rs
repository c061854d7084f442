use crate::demo::{run_demo, run_retrospective, DemoArgs, RetrospectiveArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use organising_universe::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Organising Universe",
    about = "Serve and exercise the organising universe classification engine",
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
    /// Walk through reconciliation, overrides, and rollback against in-memory stores
    Demo(DemoArgs),
    /// Re-evaluate a seeded project list and print the retrospective report
    Retrospective(RetrospectiveArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Project seed CSV loaded before the server accepts requests
    #[arg(long)]
    pub(crate) seed_csv: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Retrospective(args) => run_retrospective(args),
    }
}
