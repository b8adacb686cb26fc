mod bootstrap;
mod cli;
mod config;
mod deploy;
mod error;
mod local;
mod logging;
mod os;
mod outcome;
mod output;
mod proxy;
mod ssh;
#[cfg(test)]
mod testutil;
mod transfer;
mod verify;

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::info;

use cli::Cli;
use config::prompt::{NoPrompt, Prompter, TerminalPrompter};
use config::{DeployConfig, FileConfig};
use error::{EXIT_INTERRUPTED, EXIT_OK, EXIT_UNEXPECTED};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_path = match logging::init(cli.verbose, &cli.log_dir) {
        Ok(path) => path,
        Err(e) => {
            output::error(&format!("{:#}", e));
            return ExitCode::from(EXIT_UNEXPECTED);
        }
    };
    install_panic_hook();
    output::info(&format!("Logging to {}", log_path.display()));

    // Prompts run before the Ctrl-C handler exists, so an interrupt there
    // terminates with the default SIGINT status.
    let config = match collect(&cli) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    tokio::select! {
        biased;

        _ = tokio::signal::ctrl_c() => {
            output::error("Interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }

        result = execute(&config, cli.cleanup) => match result {
            Ok(()) => ExitCode::from(EXIT_OK),
            Err(e) => fail(&e),
        },
    }
}

fn fail(err: &anyhow::Error) -> ExitCode {
    output::error(&format!("{:#}", err));
    ExitCode::from(error::exit_code(err))
}

fn collect(cli: &Cli) -> Result<DeployConfig> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let prompter: &dyn Prompter = if std::io::stdin().is_terminal() {
        &TerminalPrompter
    } else {
        &NoPrompt
    };

    let config = DeployConfig::collect(
        |name| std::env::var(name).ok(),
        &file,
        prompter,
        cli.workdir.clone(),
    )?;
    info!(
        project = %config.project_id,
        target = %config.target(),
        branch = %config.branch,
        port = config.app_port,
        remote_dir = %config.remote_dir,
        "Configuration collected"
    );
    Ok(config)
}

async fn execute(config: &DeployConfig, cleanup: bool) -> Result<()> {
    if cleanup {
        cli::cleanup::run(config).await
    } else {
        cli::deploy::run(config).await
    }
}

/// Panics are unexpected faults: log where they happened and exit 2.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        let location = panic
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = panic
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());

        output::error(&format!("Unexpected failure at {}: {}", location, message));
        std::process::exit(EXIT_UNEXPECTED.into());
    }));
}
