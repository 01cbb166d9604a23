use clap::Parser;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    commands::init_logging(&cli)?;
    commands::run_command(cli)
}
