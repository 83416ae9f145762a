//! Command-line interface for fluid-infer.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run a pre-built inference program through a fluid-infer session.
#[derive(Parser, Debug)]
#[command(name = "fluid-infer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (per-run timings, feed/fetch details).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one inference pass.
    Infer {
        /// Path to the session config (YAML).
        #[arg(short, long)]
        config: PathBuf,

        /// Path to input data file (JSON with a `tensors` array).
        #[arg(short, long)]
        input: PathBuf,

        /// Override the device from the config (cpu, gpu:0, ...).
        #[arg(short, long)]
        device: Option<String>,

        /// Output format (json, pretty).
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Load the program and print its feed and fetch targets.
    Info {
        /// Path to the session config (YAML).
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_infer() {
        let cli = Cli::try_parse_from([
            "fluid-infer",
            "infer",
            "--config",
            "session.yaml",
            "--input",
            "input.json",
            "--device",
            "gpu:1",
        ])
        .unwrap();
        assert!(!cli.verbose);
        match cli.command {
            Commands::Infer {
                config,
                input,
                device,
                format,
            } => {
                assert_eq!(config, PathBuf::from("session.yaml"));
                assert_eq!(input, PathBuf::from("input.json"));
                assert_eq!(device.as_deref(), Some("gpu:1"));
                assert_eq!(format, "json");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_info_verbose() {
        let cli = Cli::try_parse_from(["fluid-infer", "-v", "info", "-c", "session.yaml"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Info { .. }));
    }
}
