pub mod cli;
pub mod downloader;

use clap::Parser;
use std::process::ExitCode;

use cli::Cli;

/// Parse arguments, set up logging and run the terminal shell
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    cli::init_tracing(cli.verbose);

    match cli::execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
