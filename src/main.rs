mod codec;
mod document;
mod error;
mod links;
mod logging;
mod observe;
mod offline;
mod orchestrator;
mod recovery;
mod replacements;
mod server;
mod sniff;
mod staging;
mod upstream;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve the masking proxy in front of a subscription conversion backend.
  Serve(server::Args),

  /// Mask a link, subscription or proxies document and print it with its replacement map (JSON line).
  Mask(offline::MaskArgs),

  /// Restore original values in converted output using a replacement map printed by `mask`.
  Recover(offline::RecoverArgs),
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  logging::init_logging()?;
  match cli.command {
    Commands::Serve(args) => server::run(args).await,
    Commands::Mask(args) => offline::run_mask(args).await,
    Commands::Recover(args) => offline::run_recover(args).await,
  }
}
