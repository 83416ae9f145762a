//! CLI entry point for fluid-infer.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fluid_infer::cli::{Cli, Commands};
use fluid_infer::{create_session, DataType, FlatTensor, NativeEngine, Place, SessionConfig};

/// Get the bridge backend from the build script.
fn bridge_backend() -> &'static str {
    option_env!("FLUID_BRIDGE_BACKEND").unwrap_or("unknown")
}

/// One input tensor as written in the input file.
#[derive(Debug, Deserialize)]
struct InputTensor {
    #[serde(default)]
    name: String,
    shape: Vec<usize>,
    dtype: DataType,
    data: Vec<f64>,
}

/// Expected format: `{ "tensors": [{ "shape": [..], "dtype": "float32", "data": [..] }] }`
#[derive(Debug, Deserialize)]
struct InputFile {
    tensors: Vec<InputTensor>,
}

impl InputTensor {
    fn into_flat(self) -> Result<FlatTensor> {
        let tensor = match self.dtype {
            DataType::Float32 => {
                let values: Vec<f32> = self.data.iter().map(|&v| v as f32).collect();
                FlatTensor::from_f32(self.shape, &values)
            }
            DataType::Int64 => {
                let values: Vec<i64> = self.data.iter().map(|&v| v as i64).collect();
                FlatTensor::from_i64(self.shape, &values)
            }
            other => bail!("input '{}' has unsupported dtype {}", self.name, other),
        };
        tensor
            .validate()
            .with_context(|| format!("input '{}' data does not match its shape", self.name))?;
        Ok(tensor.with_name(self.name))
    }
}

fn load_inputs(path: &Path) -> Result<Vec<FlatTensor>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input: {}", path.display()))?;
    let file: InputFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse input: {}", path.display()))?;
    file.tensors.into_iter().map(InputTensor::into_flat).collect()
}

fn load_config(path: &Path) -> Result<SessionConfig> {
    SessionConfig::from_yaml_file(path)
        .with_context(|| format!("Failed to load config: {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .init();

    match cli.command {
        Commands::Infer {
            config,
            input,
            device,
            format,
        } => {
            let mut config = load_config(&config)?;
            if let Some(device) = device {
                let place: Place = device.parse()?;
                config.device = place.device_id();
            }
            info!("Using device: {}", config.place());

            info!("Loading program");
            let mut session = create_session::<NativeEngine>(config)?;
            info!("Program loaded successfully");

            info!("Loading input: {}", input.display());
            let inputs = load_inputs(&input)?;

            info!("Running inference...");
            let result = session.run_timed(&inputs)?;
            info!(
                "Inference complete: {} outputs in {:.2}ms",
                result.outputs.len(),
                result.latency_ms
            );

            let output = serde_json::json!({
                "num_outputs": result.outputs.len(),
                "latency_ms": result.latency_ms,
                "outputs": result.outputs.iter().enumerate().map(|(i, t)| {
                    serde_json::json!({
                        "index": i,
                        "name": t.name,
                        "shape": t.shape,
                        "dtype": t.dtype,
                        "numel": t.numel(),
                    })
                }).collect::<Vec<_>>()
            });

            if format == "pretty" {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", serde_json::to_string(&output)?);
            }
        }

        Commands::Info { config } => {
            let config = load_config(&config)?;

            println!("fluid-infer v{}", env!("CARGO_PKG_VERSION"));
            println!("bridge: {}", bridge_backend());
            println!();
            println!("Program: {:?}", config.program_source()?);
            println!("Device: {}", config.place());
            println!("Variables: {:?}", config.variable_strategy());

            info!("Loading program...");
            let session = create_session::<NativeEngine>(config)?;
            println!("Feed targets: {}", session.feed_target_names().join(", "));
            println!("Fetch targets: {}", session.fetch_target_names().join(", "));
            println!("Status: OK (program loaded successfully)");
        }
    }

    Ok(())
}
