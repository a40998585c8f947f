//! Configuration for the hipo driver.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "hipo.toml";

/// Stages accepted by `--debug` and the `debug` config key.
pub const DEBUG_STAGES: &[&str] = &["lexer", "parser", "semantic", "codegen", "vm", "all"];

/// Configuration for hipo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory receiving the bytecode and the stage artifacts
    pub output_dir: PathBuf,

    /// Bytecode file name inside `output_dir`
    pub bytecode_file: String,

    /// Write tokens, AST and symbol table dumps next to the bytecode
    pub artifacts: bool,

    /// Stages to trace
    pub debug: Vec<String>,

    /// Entries kept in the REPL history
    pub history_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            bytecode_file: "program.hvm".to_string(),
            artifacts: true,
            debug: Vec::new(),
            history_size: 1000,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit path must exist. Without one, `hipo.toml` in the working
    /// directory is used when present and the defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Reads and parses one TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parses configuration text. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        for stage in &config.debug {
            if !DEBUG_STAGES.contains(&stage.as_str()) {
                anyhow::bail!(
                    "unknown debug stage '{}' (expected one of: {})",
                    stage,
                    DEBUG_STAGES.join(", ")
                );
            }
        }
        Ok(config)
    }

    /// Where `compile` writes the bytecode when no `-o` is given.
    pub fn bytecode_path(&self) -> PathBuf {
        self.output_dir.join(&self.bytecode_file)
    }
}
