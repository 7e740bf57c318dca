//! pistat - Raspberry Pi fleet controller and node agent.

use clap::Parser;
use std::process::ExitCode;

use pistat::Commands;

#[tokio::main]
async fn main() -> ExitCode {
    // Logging is set up by each command so it can honour --log-level
    let args = Commands::parse();

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
