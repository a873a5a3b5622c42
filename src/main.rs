// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::path::{Path, PathBuf};

use aimf::config::Config;
use aimf::logging::Logger;
use aimf::protocols::wire::{emf_to_seconds, seconds_to_emf};
use aimf::runtime;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug, PartialEq)]
enum Command {
    /// Run the AIMF daemon
    Run {
        /// JSON5 configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Parse and validate a configuration file, then exit
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the default configuration
    DefaultConfig,
    /// Encode an interval in seconds as an 8-bit time code
    EncodeTime { seconds: f64 },
    /// Decode an 8-bit time code to seconds
    DecodeTime {
        #[arg(value_parser = parse_code)]
        code: u8,
    },
}

/// Accept decimal or 0x-prefixed hex
fn parse_code(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid time code '{}': {}", s, e))
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run { config } => {
            let config = load_config(&config)?;
            runtime::run(config, Logger::stderr_json()).await?;
        }
        Command::CheckConfig { config } => {
            let parsed = load_config(&config)?;
            println!(
                "{}: ok ({} associations, {} routes)",
                config.display(),
                parsed.associations.len(),
                parsed.routes.len()
            );
        }
        Command::DefaultConfig => {
            println!("{}", Config::default().to_json5());
        }
        Command::EncodeTime { seconds } => {
            let code = seconds_to_emf(seconds);
            println!("0x{:02X} ({}s)", code, emf_to_seconds(code));
        }
        Command::DecodeTime { code } => {
            println!("{}s", emf_to_seconds(code));
        }
    }

    Ok(())
}
