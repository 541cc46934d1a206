//! Server configuration
//!
//! All fields have defaults so the server can start with no config file at
//! all; a JSON config is read from `CRAFTMIND_CONFIG` or the default data
//! directory when present.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Directory holding all JSON state files (memory, quests, parties, ...)
    pub data_dir: PathBuf,

    /// Path to the Node MCP server entry point (dist/index.js)
    pub mcp_server_script: PathBuf,

    /// Address the HTTP bridge listens on
    pub bind_addr: String,

    /// Base URL of the game-side command endpoint (Fabric mod)
    pub game_bridge_url: String,

    /// Base URL of the local Ollama instance
    pub ollama_url: String,

    /// Seconds between event reactor sweeps
    pub reactor_interval_secs: u64,

    /// Default timeout for MCP tool calls, in seconds
    pub mcp_call_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("craftmind");
        Self {
            mcp_server_script: data_dir.join("mcp").join("dist").join("index.js"),
            data_dir,
            bind_addr: "0.0.0.0:5557".to_string(),
            game_bridge_url: "http://localhost:5558".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            reactor_interval_secs: 5,
            mcp_call_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `CRAFTMIND_CONFIG`, falling back to
    /// `<data_dir>/config.json`, falling back to defaults.
    pub fn load() -> Result<Self> {
        let default = Self::default();
        let path = std::env::var("CRAFTMIND_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default.data_dir.join("config.json"));

        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let config: ServerConfig = serde_json::from_str(&contents)?;
            tracing::info!("Loaded config from {:?}", path);
            Ok(config)
        } else {
            tracing::info!("No config file at {:?}, using defaults", path);
            Ok(default)
        }
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn npc_config_path(&self) -> PathBuf {
        self.data_dir.join("npcs.json")
    }

    pub fn dynamic_npc_path(&self) -> PathBuf {
        self.data_dir.join("dynamic_npcs.json")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.data_dir.join("memory.json")
    }

    pub fn quest_path(&self) -> PathBuf {
        self.data_dir.join("quests.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("minecraft_events.json")
    }

    pub fn relationships_path(&self) -> PathBuf {
        self.data_dir.join("relationships.json")
    }

    pub fn merchant_inventory_path(&self) -> PathBuf {
        self.data_dir.join("merchant_inventory.json")
    }

    pub fn discovered_lore_path(&self) -> PathBuf {
        self.data_dir.join("discovered_lore.json")
    }

    pub fn quest_lore_path(&self) -> PathBuf {
        self.data_dir.join("quest_lore.json")
    }

    pub fn lore_corpus_dir(&self) -> PathBuf {
        self.data_dir.join("lore_corpus")
    }

    pub fn milestones_path(&self) -> PathBuf {
        self.data_dir.join("player_milestones.json")
    }

    pub fn parties_path(&self) -> PathBuf {
        self.data_dir.join("player_parties.json")
    }

    pub fn llm_router_config_path(&self) -> PathBuf {
        self.data_dir.join("llm_router.json")
    }

    /// Build a config rooted at an explicit directory (used by tests).
    pub fn with_data_dir(dir: &Path) -> Self {
        Self {
            data_dir: dir.to_path_buf(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5557");
        assert_eq!(config.reactor_interval_secs, 5);
        assert!(config.npc_config_path().ends_with("npcs.json"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"bindAddr": "127.0.0.1:9999"}"#).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9999");
        assert_eq!(config.ollama_url, "http://localhost:11434");
    }
}
