//! Headless service giving Minecraft NPCs memory, dialogue, quests and
//! reactions. The core is a stdio JSON-RPC bridge to a child MCP server
//! process; around it sit an HTTP boundary for the game mod and the
//! file-backed consumer services (NPCs, quests, lore, milestones, parties).

pub mod bridge;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod events;
pub mod game;
pub mod http;
pub mod llm;
pub mod lore;
pub mod milestones;
pub mod npc;
pub mod party;
pub mod reactor;
pub mod state;
pub mod store;

pub use bridge::{BridgeStatus, McpBridge};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use state::AppState;
