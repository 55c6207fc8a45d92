//! YAML simulation configuration.
//!
//! ```yaml
//! seed: 42
//! max_nodes: 16
//! log_channels: "Gain,Noise"
//! nodes:
//!   - id: 1
//!     noise_floor: { mean: -100.0, range: 5.0 }
//!     noise_trace: traces/meyer-short.txt
//!   - id: 2
//!     on: false
//! links:
//!   - { src: 1, dst: 2, gain: -54.5 }
//! ```
//!
//! Trace paths are relative to the config file's directory.

use crate::simulation::Simulation;
use motesim_common::{ChannelLog, ChannelLogConfig, NodeId, DEFAULT_MAX_NODES};
use motesim_link::{NoiseFloor, DEFAULT_SENSITIVITY};
use motesim_noise::NoiseError;
use motesim_store::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while loading or building a simulation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{path}:{line}: invalid noise sample {value:?}")]
    TraceParse {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("Noise model for node {node}: {source}")]
    Noise {
        node: NodeId,
        #[source]
        source: NoiseError,
    },

    #[error("Link table error: {0}")]
    Store(#[from] StoreError),
}

fn default_seed() -> u64 {
    1
}

fn default_max_nodes() -> u32 {
    DEFAULT_MAX_NODES
}

fn default_sensitivity() -> f64 {
    DEFAULT_SENSITIVITY
}

fn default_on() -> bool {
    true
}

/// Top-level simulation description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Seed for the engine generator. 0 acts as 1.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
    /// Comma-separated channel list, `"*"` for all.
    #[serde(default)]
    pub log_channels: String,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    /// Directory relative trace paths resolve against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            seed: default_seed(),
            max_nodes: default_max_nodes(),
            sensitivity: default_sensitivity(),
            log_channels: String::new(),
            nodes: Vec::new(),
            links: Vec::new(),
            base_dir: None,
        }
    }
}

/// Per-node settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub id: u32,
    #[serde(default = "default_on")]
    pub on: bool,
    #[serde(default)]
    pub noise_floor: Option<NoiseFloor>,
    /// File of noise readings, one integer per line.
    #[serde(default)]
    pub noise_trace: Option<PathBuf>,
    /// Inline noise readings, appended after any trace file.
    #[serde(default)]
    pub noise_samples: Option<Vec<i8>>,
}

/// One directed gain link.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    pub src: u32,
    pub dst: u32,
    pub gain: f64,
}

/// Load a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<SimConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = load_config_from_str(&text)?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    Ok(config)
}

/// Parse a configuration from YAML text. Relative trace paths resolve against
/// the working directory.
pub fn load_config_from_str(text: &str) -> Result<SimConfig, ConfigError> {
    Ok(serde_yaml::from_str(text)?)
}

/// Parse noise trace text: one integer reading per line, `#` starts a
/// comment, blank lines are skipped.
///
/// On failure, returns the 1-based line number and the offending text.
pub fn parse_trace(text: &str) -> Result<Vec<i8>, (usize, String)> {
    let mut samples = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let value = content
            .parse::<i8>()
            .map_err(|_| (index + 1, content.to_string()))?;
        samples.push(value);
    }
    Ok(samples)
}

fn read_trace(path: &Path) -> Result<Vec<i8>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_trace(&text).map_err(|(line, value)| ConfigError::TraceParse {
        path: path.to_path_buf(),
        line,
        value,
    })
}

/// Build a ready-to-run simulation from a configuration.
///
/// Nodes with noise readings are trained before this returns. Engine metric
/// descriptions are registered with the installed recorder.
pub fn build_simulation(config: &SimConfig) -> Result<Simulation, ConfigError> {
    motesim_metrics::describe_metrics();
    let log = ChannelLog::new(ChannelLogConfig::parse(&config.log_channels));
    let mut sim = Simulation::new(config.max_nodes, config.seed).with_log(log);
    sim.gain_mut().set_sensitivity(config.sensitivity);

    for node in &config.nodes {
        let id = NodeId(node.id);
        if !node.on {
            sim.turn_off(id);
        }
        if let Some(floor) = node.noise_floor {
            sim.gain_mut().set_noise(id, floor.mean, floor.range);
        }

        let mut readings = Vec::new();
        if let Some(trace) = &node.noise_trace {
            let path = match &config.base_dir {
                Some(dir) if trace.is_relative() => dir.join(trace),
                _ => trace.clone(),
            };
            readings.extend(read_trace(&path)?);
            debug!(node = node.id, path = %path.display(), "Loaded noise trace");
        }
        if let Some(samples) = &node.noise_samples {
            readings.extend_from_slice(samples);
        }

        if !readings.is_empty() {
            let noise = sim.noise_mut();
            noise.reserve(id, readings.len());
            for &r in &readings {
                noise.trace_add(id, r);
            }
            noise
                .create_model(id)
                .map_err(|source| ConfigError::Noise { node: id, source })?;
        }
    }

    for link in &config.links {
        sim.gain_mut()
            .add(NodeId(link.src), NodeId(link.dst), link.gain)?;
    }

    info!(
        nodes = config.nodes.len(),
        links = config.links.len(),
        seed = sim.seed(),
        "Simulation built"
    );
    Ok(sim)
}
