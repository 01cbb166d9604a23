use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use info_server::{build_runtime, InfoServer, ServiceConfig};
use tracing_subscriber::FmtSubscriber;

use crate::cli::{Cli, Command, ServeArgs};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Some(Command::Serve(args)) => cmd_serve(config, args),
        None => cmd_serve(config, ServeArgs::default()),
        Some(Command::ShowConfig) => cmd_show_config(&config),
    }
}

/// Install the global `fmt` subscriber at the level picked by the flags.
pub fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(cli.log_level())
        .with_target(true)
        .with_thread_ids(true);

    let installed = match &cli.log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing::subscriber::set_global_default(
                builder.with_ansi(false).with_writer(Mutex::new(file)).finish(),
            )
        }
        None => tracing::subscriber::set_global_default(builder.finish()),
    };
    installed.context("failed to install tracing subscriber")
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    match &cli.conf {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(ServiceConfig::default()),
    }
}

fn cmd_serve(mut config: ServiceConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    tracing::info!(
        bind = %config.bind_addr,
        plugin = %config.persistence.plugin,
        workers = config.worker_threads,
        "starting information service"
    );
    let runtime = build_runtime(&config).context("building tokio runtime")?;
    let server = InfoServer::new(config)?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_show_config(config: &ServiceConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
