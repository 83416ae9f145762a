//! Configuration types for fluid-infer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::Place;
use crate::error::{InferError, Result};

/// Flag name forwarded to the engine for the device memory hint.
pub const FRACTION_OF_GPU_MEMORY_FLAG: &str = "fraction_of_gpu_memory_to_use";

/// Session configuration.
///
/// Exactly one program location must be given: either `model_dir` (program
/// plus one file per parameter), or both `prog_file` and `param_file`
/// (program plus one combined parameter file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the serialized program and separate parameter files.
    pub model_dir: Option<PathBuf>,

    /// Serialized program file.
    pub prog_file: Option<PathBuf>,

    /// Combined parameter file.
    pub param_file: Option<PathBuf>,

    /// Device selector: negative for host, otherwise the accelerator index.
    pub device: i32,

    /// Materialize variables once at init and reuse them across runs.
    pub share_variables: bool,

    /// Fraction of device memory the engine may reserve. Negative means unset.
    pub fraction_of_gpu_memory: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            prog_file: None,
            param_file: None,
            device: -1,
            share_variables: false,
            fraction_of_gpu_memory: -1.0,
        }
    }
}

/// Where the engine loads the program from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSource {
    /// Program and per-parameter files in one directory.
    Directory(PathBuf),
    /// Program file plus a single combined parameter file.
    Combined { program: PathBuf, params: PathBuf },
}

/// How the session's variable scope is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableStrategy {
    /// Variables are created once at init and reused by every run.
    Shared,
    /// The engine creates fresh variables on every run.
    PerRun,
}

impl VariableStrategy {
    /// Whether `run_prepared` must create variables itself.
    pub fn creates_vars_per_run(self) -> bool {
        matches!(self, Self::PerRun)
    }
}

fn non_empty(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

impl SessionConfig {
    /// Configuration loading parameters from a directory.
    pub fn from_model_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Configuration loading a program file and a combined parameter file.
    pub fn from_files(prog_file: impl Into<PathBuf>, param_file: impl Into<PathBuf>) -> Self {
        Self {
            prog_file: Some(prog_file.into()),
            param_file: Some(param_file.into()),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InferError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Resolve the program location.
    pub fn program_source(&self) -> Result<ProgramSource> {
        let dir = non_empty(&self.model_dir);
        let prog = non_empty(&self.prog_file);
        let params = non_empty(&self.param_file);

        match (dir, prog, params) {
            (Some(dir), None, None) => Ok(ProgramSource::Directory(dir.to_path_buf())),
            (None, Some(program), Some(params)) => Ok(ProgramSource::Combined {
                program: program.to_path_buf(),
                params: params.to_path_buf(),
            }),
            (None, None, None) => Err(InferError::config(
                "no model location: set model_dir, or prog_file and param_file",
            )),
            (Some(_), _, _) => Err(InferError::config(
                "model_dir cannot be combined with prog_file/param_file",
            )),
            (None, Some(_), None) => Err(InferError::config("prog_file is set without param_file")),
            (None, None, Some(_)) => Err(InferError::config("param_file is set without prog_file")),
        }
    }

    /// Device placement selected by `device`.
    pub fn place(&self) -> Place {
        Place::from_device_id(self.device)
    }

    pub fn variable_strategy(&self) -> VariableStrategy {
        if self.share_variables {
            VariableStrategy::Shared
        } else {
            VariableStrategy::PerRun
        }
    }

    /// Check the configuration without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        self.program_source()?;
        let fraction = self.fraction_of_gpu_memory;
        if fraction.is_nan() || fraction > 1.0 {
            return Err(InferError::config(format!(
                "fraction_of_gpu_memory must be within [0, 1] or negative to leave unset, got {}",
                fraction
            )));
        }
        Ok(())
    }

    /// Process-wide engine flags implied by this configuration.
    pub fn global_flags(&self) -> Vec<String> {
        let fraction = self.fraction_of_gpu_memory;
        if fraction > 0.0 && fraction <= 1.0 {
            vec![format!("--{}={}", FRACTION_OF_GPU_MEMORY_FLAG, fraction)]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.device, -1);
        assert!(!config.share_variables);
        assert_eq!(config.place(), Place::Cpu);
        assert_eq!(config.variable_strategy(), VariableStrategy::PerRun);
        assert!(config.global_flags().is_empty());
    }

    #[test]
    fn test_program_source_modes() {
        let config = SessionConfig::from_model_dir("/models/word2vec");
        assert_eq!(
            config.program_source().unwrap(),
            ProgramSource::Directory(PathBuf::from("/models/word2vec"))
        );

        let config = SessionConfig::from_files("/m/__model__", "/m/__params__");
        assert_eq!(
            config.program_source().unwrap(),
            ProgramSource::Combined {
                program: PathBuf::from("/m/__model__"),
                params: PathBuf::from("/m/__params__"),
            }
        );
    }

    #[test]
    fn test_program_source_invalid() {
        assert!(matches!(
            SessionConfig::default().program_source(),
            Err(InferError::Config(_))
        ));

        let half = SessionConfig {
            prog_file: Some(PathBuf::from("/m/__model__")),
            ..SessionConfig::default()
        };
        assert!(half.program_source().is_err());

        let both = SessionConfig {
            model_dir: Some(PathBuf::from("/m")),
            ..SessionConfig::from_files("/m/__model__", "/m/__params__")
        };
        assert!(both.program_source().is_err());

        let empty = SessionConfig::from_model_dir("");
        assert!(empty.program_source().is_err());
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
model_dir: /models/ssd_mobilenet
device: 0
share_variables: true
fraction_of_gpu_memory: 0.5
"#;
        let config = SessionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.place(), Place::Gpu(0));
        assert_eq!(config.variable_strategy(), VariableStrategy::Shared);
        assert_eq!(
            config.global_flags(),
            vec!["--fraction_of_gpu_memory_to_use=0.5".to_string()]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_fraction() {
        let mut config = SessionConfig::from_model_dir("/m");
        config.fraction_of_gpu_memory = 1.5;
        assert!(config.validate().is_err());
        config.fraction_of_gpu_memory = 0.0;
        assert!(config.validate().is_ok());
        assert!(config.global_flags().is_empty());
    }
}
