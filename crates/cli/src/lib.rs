pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "rolecall",
    about = "Rolecall operator CLI",
    long_about = "Inspect configuration, check store readiness, list persisted role menus and apply the SQLite schema.",
    after_help = "Examples:\n  rolecall doctor --json\n  rolecall config\n  rolecall menus"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, bot token readiness, and binding store readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Print every persisted role menu and its bindings as JSON")]
    Menus,
    #[command(about = "Apply pending SQLite migrations and return structured status output")]
    Migrate,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Menus => commands::menus::run(),
        Command::Migrate => commands::migrate::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
