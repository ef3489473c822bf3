mod cli;
mod client;
mod one_shot;
mod serve;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cuebridge_cli=info,cuebridge_api=info,cuebridge_pool=info,\
                 cuebridge_engine=info,cuebridge_core=info,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = cli::Cli::parse();

    let result = match args.command {
        cli::Command::Serve(args) => serve::run(args).await,
        cli::Command::RunPlanTask(args) => one_shot::run(args).await,
        cli::Command::RunTask(args) => client::run(args).await,
    };

    // Exit codes propagate to the external scheduler, which decides
    // retries from them.
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            std::process::exit(1);
        }
    }
}
