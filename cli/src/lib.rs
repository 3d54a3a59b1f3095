use cutting::{CancellationToken, CutterConfig, GridRequest};
use dataset::{PairConfig, SplitPlan};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[cfg(unix)]
use signal_hook::consts::signal::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook::iterator::Signals;

#[derive(Error, Debug)]
pub enum JigsawConfigError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Missing 'input_dir' field")]
    MissingInputDir,
    #[error("Missing 'output_dir' field")]
    MissingOutputDir,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Pair dataset settings, applied after a batch finishes
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DatasetSection {
    pub output_dir: String,
    #[serde(default)]
    pub split: SplitPlan,
    #[serde(default)]
    pub pairs: PairConfig,
}

/// Batch cutting configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BatchConfig {
    /// Directory of source images
    pub input_dir: String,
    /// One sub-directory per puzzle is created here
    pub output_dir: String,
    #[serde(default)]
    pub grid: GridRequest,
    /// Edge seed; a random one is drawn and logged when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Reuse a previously written `edges.json` instead of generating edges
    #[serde(default)]
    pub edges_path: Option<String>,
    /// Worker threads, 0 for one per core
    #[serde(default)]
    pub threads: usize,
    #[serde(default)]
    pub cutter: CutterConfig,
    #[serde(default)]
    pub dataset: Option<DatasetSection>,
}

impl BatchConfig {
    pub fn new(input_dir: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            grid: GridRequest::default(),
            seed: None,
            edges_path: None,
            threads: 0,
            cutter: CutterConfig::default(),
            dataset: None,
        }
    }

    /// Get the JSON schema of the configuration file
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(BatchConfig)
    }

    fn validate(self) -> Result<Self, JigsawConfigError> {
        if self.input_dir.trim().is_empty() {
            return Err(JigsawConfigError::MissingInputDir);
        }
        if self.output_dir.trim().is_empty() {
            return Err(JigsawConfigError::MissingOutputDir);
        }
        Ok(self)
    }

    /// Load BatchConfig from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, JigsawConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load BatchConfig from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, JigsawConfigError> {
        let config: BatchConfig = toml::from_str(content)?;
        config.validate()
    }

    /// Load BatchConfig from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, JigsawConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load BatchConfig from a JSON string
    pub fn from_json(content: &str) -> Result<Self, JigsawConfigError> {
        let config: BatchConfig = serde_json::from_str(content)?;
        config.validate()
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, JigsawConfigError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(JigsawConfigError::UnsupportedFileFormat),
        }
    }

    /// Save BatchConfig to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), JigsawConfigError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, JigsawConfigError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Save BatchConfig to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), JigsawConfigError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, JigsawConfigError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }
}

/// Cancels a [`CancellationToken`] on SIGINT or SIGTERM while alive.
///
/// Work already started finishes; images and pieces not yet started are
/// skipped. A second signal is ignored, the batch still ends on its own.
pub struct SignalCancel {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    #[cfg(unix)]
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SignalCancel {
    #[cfg(unix)]
    pub fn install(token: CancellationToken) -> std::io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for signal in signals.forever() {
                tracing::warn!("Signal {} received, cancelling remaining work", signal);
                token.cancel();
            }
        });
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    #[cfg(not(unix))]
    pub fn install(_token: CancellationToken) -> std::io::Result<Self> {
        Ok(Self {})
    }
}

#[cfg(unix)]
impl Drop for SignalCancel {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
