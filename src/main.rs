use clap::Parser;
use nwp_verifier::cli::{run, Cli};
use nwp_verifier::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
