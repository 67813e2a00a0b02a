//! Server configuration: defaults, an optional TOML file, then command line
//! overrides.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::classifier::{Classifier, ClassifierLoadError, OnnxClassifier, OnnxSettings, StubClassifier};
use crate::service::DEFAULT_CONFIDENCE_THRESHOLD;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("confidence threshold {0} is outside [0, 1]")]
    Threshold(f64),

    #[error("max_upload_bytes must be greater than zero")]
    UploadLimit,
}

#[derive(Parser, Debug, Default)]
#[command(name = "aisle-finder")]
#[command(about = "Upload a grocery product photo, get its aisle and shelf")]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Product catalog (`.csv` table or JSON array of products)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Minimum confidence for a catalog lookup
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn default_stub_label() -> String {
    "banana".to_string()
}

fn default_stub_confidence() -> f64 {
    0.95
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClassifierConfig {
    Stub {
        #[serde(default = "default_stub_label")]
        label: String,
        #[serde(default = "default_stub_confidence")]
        confidence: f64,
    },
    Onnx(OnnxSettings),
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::Stub {
            label: default_stub_label(),
            confidence: default_stub_confidence(),
        }
    }
}

impl ClassifierConfig {
    pub fn build(&self) -> Result<Box<dyn Classifier>, ClassifierLoadError> {
        match self {
            ClassifierConfig::Stub { label, confidence } => {
                log::warn!("Using stub classifier, every image is `{}`", label);
                Ok(Box::new(StubClassifier::new(label.clone(), *confidence)))
            }
            ClassifierConfig::Onnx(settings) => {
                Ok(Box::new(OnnxClassifier::load(settings.clone())?))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub catalog_path: PathBuf,
    pub confidence_threshold: f64,
    pub max_upload_bytes: usize,
    pub classifier: ClassifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            catalog_path: PathBuf::from("data/products.json"),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_upload_bytes: 10 * 1024 * 1024,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Loads the file named by `--config` (if any) and applies flag overrides.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(host) = &args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(catalog) = &args.catalog {
            config.catalog_path = catalog.clone();
        }
        if let Some(threshold) = args.threshold {
            config.confidence_threshold = threshold;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Threshold(self.confidence_threshold));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::UploadLimit);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
