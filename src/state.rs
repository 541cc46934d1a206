//! Shared application state
//!
//! The composition root owns one bridge instance and one of each consumer
//! service. Services that mutate their own JSON files sit behind an async
//! RwLock; the bridge serializes itself internally and needs none.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bridge::McpBridge;
use crate::config::ServerConfig;
use crate::dialogue::DialogueService;
use crate::events::EventLog;
use crate::game::GameCommander;
use crate::llm::LlmRouter;
use crate::lore::LoreService;
use crate::milestones::MilestoneService;
use crate::npc::quests::QuestService;
use crate::npc::NpcService;
use crate::party::PartyService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub bridge: Arc<McpBridge>,
    pub router: Arc<LlmRouter>,
    pub game: Arc<GameCommander>,
    pub npcs: Arc<RwLock<NpcService>>,
    pub quests: Arc<RwLock<QuestService>>,
    pub dialogue: Arc<RwLock<DialogueService>>,
    pub lore: Arc<RwLock<LoreService>>,
    pub milestones: Arc<RwLock<MilestoneService>>,
    pub parties: Arc<RwLock<PartyService>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let events = EventLog::new(config.events_path());
        let bridge = McpBridge::new(config.mcp_server_script.clone());
        let router = LlmRouter::from_config_file(
            &config.llm_router_config_path(),
            &config.ollama_url,
        );
        let game = GameCommander::new(&config.game_bridge_url);

        let npcs = NpcService::new(&config, events.clone());
        let quests = QuestService::new(
            config.quest_path(),
            config.quest_lore_path(),
            events.clone(),
        );
        let dialogue = DialogueService::new(
            config.relationships_path(),
            config.merchant_inventory_path(),
        );
        let lore = LoreService::new(config.discovered_lore_path(), config.lore_corpus_dir());
        let milestones = MilestoneService::new(config.milestones_path(), events);
        let parties = PartyService::new(config.parties_path());

        Self {
            config: Arc::new(config),
            bridge: Arc::new(bridge),
            router: Arc::new(router),
            game: Arc::new(game),
            npcs: Arc::new(RwLock::new(npcs)),
            quests: Arc::new(RwLock::new(quests)),
            dialogue: Arc::new(RwLock::new(dialogue)),
            lore: Arc::new(RwLock::new(lore)),
            milestones: Arc::new(RwLock::new(milestones)),
            parties: Arc::new(RwLock::new(parties)),
        }
    }
}
