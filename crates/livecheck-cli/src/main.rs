use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use livecheck_core::Step;
use tracing_subscriber::EnvFilter;

mod replay;

#[derive(Parser)]
#[command(name = "livecheck", version, about = "Active liveness checklist tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded detection feed (JSON lines) and render the checklist
    Replay {
        /// Feed file, one detection record per line
        file: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
        /// TOML config file (overrides $LIVECHECK_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop as soon as every step is complete
        #[arg(long)]
        exit_when_complete: bool,
    },
    /// List the checklist steps in display order
    Steps,
    /// Print the effective configuration as TOML
    Config {
        /// TOML config file (overrides $LIVECHECK_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            file,
            format,
            config,
            exit_when_complete,
        } => replay::run(&file, format, config.as_deref(), exit_when_complete).await,
        Command::Steps => {
            for (i, step) in Step::ALL.iter().enumerate() {
                println!("{}. {}", i + 1, step.label());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { config } => {
            let config = livecheckd::Config::load(config.as_deref())?;
            print!("{}", toml::to_string(&config.to_file_config())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
