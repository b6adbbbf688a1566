pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "specbridge",
    about = "Specbridge operator CLI",
    long_about = "Inspect configuration, check webhook readiness, and sign test requests.",
    after_help = "Examples:\n  specbridge doctor --json\n  specbridge config\n  specbridge sign --body 'command=/specify&text=hello'"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, signing secret readiness, and follow-up delivery setup")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Compute the v0 signature headers for a request body")]
    Sign {
        #[arg(long, help = "Unix timestamp to sign (defaults to now)")]
        timestamp: Option<String>,
        #[arg(long, help = "Raw request body, exactly as it will be sent")]
        body: String,
        #[arg(long, help = "Signing secret (defaults to the configured secret)")]
        secret: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Sign { timestamp, body, secret } => {
            commands::sign::run(timestamp.as_deref(), &body, secret)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
