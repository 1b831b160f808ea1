use clap::Parser;
use shopfloor_cli::CliArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    shopfloor_cli::run(args).await?;
    Ok(())
}
