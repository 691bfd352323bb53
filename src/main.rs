mod cli;
mod commands;
mod config;
mod error;
mod extract;
mod page_range;
mod pdf;
mod server;
mod workspace;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "debug,tower_http=debug"
    } else {
        "info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let timeout = Duration::from_secs(cli.tool.tool_timeout_secs.max(1));

    match cli.command {
        Commands::Serve(serve) => {
            let config = config::Config::from_args(serve, cli.tool)?;
            commands::serve::run(config).await?;
        }
        Commands::Pages { path } => {
            commands::pages::run(&path, cli.tool.gs_command.as_deref(), timeout).await?;
        }
        Commands::Extract {
            path,
            pages,
            output,
            work_dir,
        } => {
            commands::extract::run(commands::extract::ExtractOptions {
                input: &path,
                pages: &pages,
                output: &output,
                work_dir,
                gs_command: cli.tool.gs_command.as_deref(),
                timeout,
            })
            .await?;
        }
    }

    Ok(())
}
