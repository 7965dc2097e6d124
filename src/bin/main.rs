use clap::Parser;
use kvlog::command::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.exec()?;
    Ok(())
}
