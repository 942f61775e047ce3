//! Run configuration shared by the master and the workers.

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    DEFAULT_CUSUM_DRIFT, DEFAULT_CUSUM_THRESHOLD, DEFAULT_ENTROPY_THRESHOLD,
    DEFAULT_MIN_ADDR_COUNT, DEFAULT_PCA_THRESHOLD, DEFAULT_PCA_WARMUP_WINDOWS,
    DEFAULT_WINDOW_SIZE,
};

/// Operating mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Analyse a labelled dataset file once.
    #[default]
    Dataset,
    /// Analyse an arbitrary capture CSV once (same pipeline as `Dataset`).
    Custom,
    /// Watch a capture directory and analyse each new window file.
    Live,
}

impl Mode {
    pub fn parse(value: &str) -> Result<Mode, ConfigError> {
        match value {
            "dataset" => Ok(Mode::Dataset),
            "custom" => Ok(Mode::Custom),
            "live" => Ok(Mode::Live),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Which detectors participate in the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorSet {
    pub entropy: bool,
    pub pca: bool,
    pub cusum: bool,
}

impl Default for DetectorSet {
    fn default() -> Self {
        DetectorSet {
            entropy: true,
            pca: true,
            cusum: true,
        }
    }
}

impl DetectorSet {
    /// Parses a comma-separated subset of `entropy,pca,cusum`.
    ///
    /// A selection that names no known detector falls back to all three.
    pub fn parse(value: &str) -> DetectorSet {
        let mut set = DetectorSet {
            entropy: false,
            pca: false,
            cusum: false,
        };
        for name in value.split(',') {
            match name.trim().to_ascii_lowercase().as_str() {
                "entropy" => set.entropy = true,
                "pca" => set.pca = true,
                "cusum" => set.cusum = true,
                _ => {}
            }
        }
        if !set.any() { DetectorSet::default() } else { set }
    }

    pub fn any(&self) -> bool {
        self.entropy || self.pca || self.cusum
    }
}

impl std::fmt::Display for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.entropy {
            names.push("entropy");
        }
        if self.pca {
            names.push("pca");
        }
        if self.cusum {
            names.push("cusum");
        }
        write!(f, "{}", names.join(","))
    }
}

/// Errors raised while assembling or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown mode: {0} (expected dataset, custom or live)")]
    UnknownMode(String),
    #[error("--input is required for dataset/custom mode")]
    MissingInput,
    #[error("window size must be at least 1")]
    BadWindowSize,
    #[error("invalid rate limit spec: {0}")]
    BadRateLimit(String),
}

/// Full configuration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    pub input_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Interface the rate-limit filters attach to.
    pub interface: String,
    pub window_size: usize,
    pub detectors: DetectorSet,
    pub entropy_threshold: f64,
    pub pca_threshold: f64,
    pub cusum_threshold: f64,
    pub pca_warmup_windows: u32,
    pub cusum_drift: f64,
    pub enable_mitigation: bool,
    pub min_addr_count: u32,
    pub rate_limit: String,
    pub rate_burst: String,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            mode: Mode::Dataset,
            input_path: None,
            output_dir: PathBuf::from("./results"),
            interface: "eth0".to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
            detectors: DetectorSet::default(),
            entropy_threshold: DEFAULT_ENTROPY_THRESHOLD,
            pca_threshold: DEFAULT_PCA_THRESHOLD,
            cusum_threshold: DEFAULT_CUSUM_THRESHOLD,
            pca_warmup_windows: DEFAULT_PCA_WARMUP_WINDOWS,
            cusum_drift: DEFAULT_CUSUM_DRIFT,
            enable_mitigation: false,
            min_addr_count: DEFAULT_MIN_ADDR_COUNT,
            rate_limit: "10mbit".to_string(),
            rate_burst: "100k".to_string(),
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Convenience for tests and examples.
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    /// Checks cross-field requirements after CLI or interactive assembly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::BadWindowSize);
        }
        if matches!(self.mode, Mode::Dataset | Mode::Custom) && self.input_path.is_none() {
            return Err(ConfigError::MissingInput);
        }
        if self.rate_limit.is_empty() {
            return Err(ConfigError::BadRateLimit(self.rate_limit.clone()));
        }
        Ok(())
    }
}
