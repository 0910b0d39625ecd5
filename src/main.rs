//! Mercourier entry point.

use std::process::ExitCode;

use clap::Parser;
use console::style;
use tokio_util::sync::CancellationToken;

use mercourier::application::{shutdown, startup};
use mercourier::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let token = CancellationToken::new();
    tokio::spawn(shutdown::cancel_on_signal(token.clone()));

    match startup::run(cli, token).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {error}", style("error:").red().bold());
            ExitCode::from(error.exit_code())
        }
    }
}
