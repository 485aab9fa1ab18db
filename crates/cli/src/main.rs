use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use th_cli::bootstrap;
use th_cli::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to status when no subcommand is given.
        None => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::status::status(Arc::new(config), None, false).await
        }
        Some(Command::Status { character, json }) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::status::status(Arc::new(config), character, json).await
        }
        Some(Command::Tools { character, json }) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::status::tools(Arc::new(config), character, json).await
        }
        Some(Command::Call {
            server,
            tool,
            args,
            character,
            json,
        }) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::call::call(Arc::new(config), server, tool, args, character, json).await
        }
        Some(Command::Watch { character, poll_secs }) => {
            init_tracing();
            let (config, config_path) = cli::load_config()?;
            cli::watch::watch(Arc::new(config), config_path, character, poll_secs).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            init_cli_tracing();
            let (config, config_path) = cli::load_config()?;
            let supervisor = bootstrap::build_supervisor(Arc::new(config));
            let valid = cli::config::validate(&supervisor, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("toolhost {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON logs for the long-running `watch` command. Logs go to
/// stderr; stdout carries the reload events.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,th_supervisor=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

/// Compact stderr logging for one-shot commands, so stdout stays clean.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
