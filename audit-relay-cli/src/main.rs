use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

use commands::check_cert::CheckCertArgs;
use commands::collect::CollectArgs;
use commands::send::SendArgs;

/// audit-relay - audit event fan-out operator tool
#[derive(Parser)]
#[command(name = "audit-relay")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log filter directive for diagnostics on stderr
    #[arg(long, global = true, env = "AUDIT_RELAY_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for records and print them to stdout
    Collect(CollectArgs),
    /// Dispatch one event through the configured registrations
    Send(SendArgs),
    /// Validate a certificate bundle for an algorithm mode
    CheckCert(CheckCertArgs),
}

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Execute command
    let result = match cli.command {
        Commands::Collect(args) => commands::collect::execute(args, &cli.log_level).await,
        Commands::Send(args) => commands::send::execute(args, &cli.log_level).await,
        Commands::CheckCert(args) => commands::check_cert::execute(args).await,
    };

    // Handle result
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);

            // Show context if available
            if let Some(source) = e.source() {
                eprintln!("\n{} {}", "Caused by:".yellow(), source);
            }

            std::process::exit(1);
        }
    }
}
