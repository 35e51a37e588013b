use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use catering_desk::cli::Cli;
use catering_desk::context::AppContext;
use catering_desk::{commands, config, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    init_logging(&data_dir);

    let mut ctx = match AppContext::open(data_dir, cli.api_base) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "failed to open local store");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    match commands::run(cli.command, &mut ctx).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output.trim_end());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
