use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::node::HypervisorKind;

/// Default location of the persisted node configuration.
pub const DEFAULT_PATH: &str = "/etc/stratus.json";

/// Per-node configuration, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub mongo_uri: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub hypervisor: HypervisorKind,
}

/// Resolve the config path, honoring the STRATUS_CONF override.
pub fn path() -> PathBuf {
    std::env::var("STRATUS_CONF")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_PATH))
}

/// Load the node configuration. A missing file yields the default config.
pub fn load() -> Result<NodeConfig> {
    load_path(&path())
}

pub fn load_path(path: &Path) -> Result<NodeConfig> {
    if !path.exists() {
        return Ok(NodeConfig::default());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("config: Failed to read {}", path.display()))?;
    let config: NodeConfig = serde_json::from_str(&data)
        .with_context(|| format!("config: Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Persist the node configuration.
pub fn save(config: &NodeConfig) -> Result<()> {
    save_path(config, &path())
}

pub fn save_path(config: &NodeConfig, path: &Path) -> Result<()> {
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data)
        .with_context(|| format!("config: Failed to write {}", path.display()))?;
    Ok(())
}
