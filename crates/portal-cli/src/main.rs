//! portalctl
//!
//! Exit codes: 0 success, 1 generic, 2 validation or config, 3 not found,
//! 4 unauthorized, 5 conflict, 6 rate limited.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

use portal_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    portal_core::tracing_init::init_cli_tracing("portalctl=warn,portal_cli=warn,portal_server=warn");

    match portal_cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = writeln!(std::io::stderr(), "Error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
