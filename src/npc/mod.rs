//! NPC registry, memory and dialogue generation
//!
//! NPCs come from two places: a static config file and a dynamic file of
//! NPCs spawned from templates at runtime. Conversation memory is kept per
//! (npc, player) pair and fed back into prompts.

pub mod challenges;
pub mod quests;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::ServerConfig;
use crate::events::{EventLog, PlayerContext};
use crate::llm::{ChatMessage, LlmRouter, TaskType};
use crate::{store, Error, Result};

use challenges::ChallengeTemplate;

/// Most recent messages kept per (npc, player) pair.
const MEMORY_CAP: usize = 20;
/// Hard cap applied to every pair when the memory file is written.
const MEMORY_DISK_CAP: usize = 50;
/// Conversation turns included in the prompt.
const PROMPT_HISTORY: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub dimension: Option<String>,
    #[serde(default)]
    pub biome: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub personality: String,
    pub backstory: String,
    pub model: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(rename = "questTypes", default)]
    pub quest_types: Vec<String>,
    #[serde(default)]
    pub appearance: Option<String>,
    #[serde(default)]
    pub skin: Option<String>,
    #[serde(default)]
    pub dialogue_style: String,
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcTemplate {
    pub base_personality: String,
    pub base_backstory: String,
    pub models: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub quest_types: Vec<String>,
    #[serde(default)]
    pub dialogue_style: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Shape of the static NPC config file.
#[derive(Debug, Default, Deserialize)]
pub struct NpcConfigFile {
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub npc_templates: HashMap<String, NpcTemplate>,
    #[serde(default)]
    pub build_challenges: Vec<ChallengeTemplate>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DynamicNpcFile {
    #[serde(default)]
    npcs: Vec<Npc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

pub struct NpcService {
    dynamic_path: PathBuf,
    memory_path: PathBuf,
    events: EventLog,
    npcs: HashMap<String, Npc>,
    templates: HashMap<String, NpcTemplate>,
    challenges: Vec<ChallengeTemplate>,
    memory: HashMap<String, Vec<MemoryEntry>>,
}

impl NpcService {
    pub fn new(config: &ServerConfig, events: EventLog) -> Self {
        let static_config: NpcConfigFile =
            store::load_or_default(&config.npc_config_path(), NpcConfigFile::default);
        let dynamic: DynamicNpcFile =
            store::load_or_default(&config.dynamic_npc_path(), DynamicNpcFile::default);

        let mut npcs = HashMap::new();
        for npc in static_config.npcs {
            npcs.insert(npc.id.clone(), npc);
        }
        for npc in dynamic.npcs {
            npcs.insert(npc.id.clone(), npc);
        }

        let memory = store::load_or_default(&config.memory_path(), HashMap::new);

        tracing::info!("NPC service initialized with {} NPCs", npcs.len());

        Self {
            dynamic_path: config.dynamic_npc_path(),
            memory_path: config.memory_path(),
            events,
            npcs,
            templates: static_config.npc_templates,
            challenges: static_config.build_challenges,
            memory,
        }
    }

    pub fn get(&self, npc_id: &str) -> Result<&Npc> {
        self.npcs
            .get(npc_id)
            .ok_or_else(|| Error::NpcNotFound(npc_id.to_string()))
    }

    pub fn npcs(&self) -> &HashMap<String, Npc> {
        &self.npcs
    }

    pub fn list(&self) -> Vec<&Npc> {
        let mut list: Vec<&Npc> = self.npcs.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn challenge_templates(&self) -> &[ChallengeTemplate] {
        &self.challenges
    }

    pub fn player_context(&self, player: &str, nearby: Vec<JsonValue>) -> PlayerContext {
        self.events.player_context(player, nearby)
    }

    /// Spawn a dynamic NPC from a template. Details come from the LLM when
    /// it cooperates, otherwise the template's base text is used as-is.
    pub async fn create_npc(
        &mut self,
        router: &LlmRouter,
        template_id: &str,
        location: Location,
        name: Option<&str>,
    ) -> Result<Npc> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| Error::TemplateNotFound(template_id.to_string()))?
            .clone();

        let details = self
            .generate_npc_details(router, &template, &location, name)
            .await;

        let npc_id = format!(
            "{}_{}_{}",
            template_id,
            Utc::now().timestamp(),
            rand::thread_rng().gen_range(1000..10000)
        );

        let model = template
            .models
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "llama3.2:latest".to_string());

        let npc = Npc {
            id: npc_id.clone(),
            name: details.name,
            personality: details.personality,
            backstory: details.backstory,
            model,
            location: Some(location),
            interests: template.interests.clone(),
            quest_types: template.quest_types.clone(),
            appearance: Some("player_model".to_string()),
            skin: Some(format!("{template_id}.png")),
            dialogue_style: template.dialogue_style.clone(),
            is_dynamic: true,
            template_id: Some(template_id.to_string()),
            created_at: Some(Utc::now().to_rfc3339()),
        };

        tracing::info!("Created new dynamic NPC: {} ({})", npc.name, npc_id);
        self.npcs.insert(npc_id, npc.clone());
        self.save_dynamic();
        Ok(npc)
    }

    async fn generate_npc_details(
        &self,
        router: &LlmRouter,
        template: &NpcTemplate,
        location: &Location,
        name: Option<&str>,
    ) -> NpcDetails {
        let mut prompt = format!(
            "Generate a unique Minecraft NPC character based on this template:\n\
             Template: {}\n\
             Backstory Base: {}\n\
             Location: {} biome at ({}, {}, {})\n\n",
            template.base_personality,
            template.base_backstory,
            location.biome.as_deref().unwrap_or("unknown"),
            location.x,
            location.y,
            location.z,
        );
        match name {
            Some(name) => prompt.push_str(&format!("Name: {name}\n")),
            None => prompt.push_str("Generate a fitting fantasy name.\n"),
        }
        prompt.push_str(
            "\nReturn ONLY valid JSON in this format:\n\
             {\n  \"name\": \"Name\",\n  \"personality\": \"Detailed personality description extending the base\",\n  \"backstory\": \"Specific backstory connecting them to this location and their role\"\n}\n",
        );

        let model = template.models.first().map(String::as_str).unwrap_or("llama3.2:latest");

        match router.generate_json(model, &prompt).await {
            Ok(value) => {
                let field = |key: &str| {
                    value
                        .get(key)
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                };
                NpcDetails {
                    name: field("name")
                        .or_else(|| name.map(str::to_string))
                        .unwrap_or_else(|| "Unknown Wanderer".to_string()),
                    personality: field("personality")
                        .unwrap_or_else(|| template.base_personality.clone()),
                    backstory: field("backstory")
                        .unwrap_or_else(|| template.base_backstory.clone()),
                }
            }
            Err(e) => {
                tracing::error!("Error generating NPC details: {}", e);
                NpcDetails {
                    name: name.map(str::to_string).unwrap_or_else(|| {
                        format!(
                            "Unknown {}",
                            template.kind.as_deref().unwrap_or("NPC")
                        )
                    }),
                    personality: template.base_personality.clone(),
                    backstory: template.base_backstory.clone(),
                }
            }
        }
    }

    fn save_dynamic(&self) {
        let dynamic = DynamicNpcFile {
            npcs: self
                .npcs
                .values()
                .filter(|n| n.is_dynamic)
                .cloned()
                .collect(),
        };
        store::save_best_effort(&self.dynamic_path, &dynamic, "dynamic NPCs");
    }

    pub fn memory_for(&self, npc_id: &str, player: &str) -> &[MemoryEntry] {
        self.memory
            .get(&memory_key(npc_id, player))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn add_to_memory(&mut self, npc_id: &str, player: &str, role: &str, content: &str) {
        let entries = self.memory.entry(memory_key(npc_id, player)).or_default();
        entries.push(MemoryEntry {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });
        if entries.len() > MEMORY_CAP {
            entries.drain(..entries.len() - MEMORY_CAP);
        }
        self.save_memory();
    }

    fn save_memory(&mut self) {
        for entries in self.memory.values_mut() {
            if entries.len() > MEMORY_DISK_CAP {
                entries.drain(..entries.len() - MEMORY_DISK_CAP);
            }
        }
        store::save_best_effort(&self.memory_path, &self.memory, "NPC memory");
    }

    /// Generate an in-character response. Router failures come back as an
    /// in-world shrug rather than an error, so the game never shows a stack
    /// trace to a player.
    pub async fn generate_response(
        &mut self,
        router: &LlmRouter,
        npc_id: &str,
        player: &str,
        player_message: &str,
        context: Option<PlayerContext>,
    ) -> Result<String> {
        let npc = self.get(npc_id)?.clone();
        let context = context.unwrap_or_else(|| self.events.player_context(player, Vec::new()));

        let system_prompt = build_system_prompt(&npc, player, &context);
        let mut messages = vec![ChatMessage::system(system_prompt)];
        let history = self.memory_for(npc_id, player);
        let start = history.len().saturating_sub(PROMPT_HISTORY);
        for entry in &history[start..] {
            messages.push(ChatMessage {
                role: entry.role.clone(),
                content: entry.content.clone(),
            });
        }
        messages.push(ChatMessage::user(player_message));

        match router.chat(&messages, TaskType::Dialogue).await {
            Ok(response) => {
                self.add_to_memory(npc_id, player, "user", player_message);
                self.add_to_memory(npc_id, player, "assistant", &response);
                Ok(response)
            }
            Err(e) => {
                tracing::error!("Router error for {}: {}", npc_id, e);
                Ok(format!("[{} seems distracted and doesn't respond]", npc.name))
            }
        }
    }

    /// Pick a quest type from the NPC's repertoire and the player's recent
    /// activity.
    pub fn suggest_quest_type(npc: &Npc, context: &PlayerContext) -> String {
        let has_combat = !context.recent_activity.combat.is_empty();
        let has_building = !context.recent_activity.building.is_empty();
        let offers = |t: &str| npc.quest_types.iter().any(|q| q == t);

        if has_combat && offers("combat") {
            "combat".to_string()
        } else if has_building && offers("building") {
            "building".to_string()
        } else if let Some(first) = npc.quest_types.first() {
            first.clone()
        } else {
            "exploration".to_string()
        }
    }
}

struct NpcDetails {
    name: String,
    personality: String,
    backstory: String,
}

fn memory_key(npc_id: &str, player: &str) -> String {
    format!("{npc_id}:{player}")
}

/// One-line summary of recent activity for quest prompts.
pub fn summarize_activity(context: &PlayerContext) -> String {
    let stats = &context.stats;
    let mut parts = Vec::new();
    if stats.builds_completed > 0 {
        parts.push(format!("building ({} blocks)", stats.blocks_placed));
    }
    if stats.mobs_killed > 0 {
        parts.push(format!("fighting ({} mobs killed)", stats.mobs_killed));
    }
    if !stats.biomes_visited.is_empty() {
        parts.push(format!("exploring ({} biomes)", stats.biomes_visited.len()));
    }
    if parts.is_empty() {
        "exploring the world".to_string()
    } else {
        parts.join(", ")
    }
}

/// Build the hardened in-character system prompt: critical directive first,
/// then character definition, situation, recent activity and witnesses.
pub fn build_system_prompt(npc: &Npc, player: &str, context: &PlayerContext) -> String {
    let mut prompt = format!(
        "[CRITICAL DIRECTIVE - READ FIRST]\n\
         You are generating dialogue for a game character. You are NOT chatting with a user.\n\
         NEVER reference being an AI, language model, or assistant.\n\
         NEVER say \"I cannot\", \"I don't have access\", or \"According to my training\".\n\
         NEVER use brackets [ ] or (Note: ...) in your responses.\n\
         If asked something you don't know, respond in-character with \"I haven't heard of that\" or similar.\n\n\
         [CHARACTER DEFINITION]\n\
         Name: {}\n\
         Personality: {}\n\
         Backstory: {}\n\
         Dialogue Style: {}\n\
         Interests: {}\n\n\
         [GOOD vs BAD EXAMPLES]\n\
         BAD: \"As an AI, I think wheat is good for you.\"\n\
         GOOD: \"Wheat's the best crop around these parts.\"\n\n\
         BAD: \"I don't have access to that information.\"\n\
         GOOD: \"Can't say I've heard of that before.\"\n\n\
         BAD: \"[Note: This is important] You should be careful.\"\n\
         GOOD: \"You should be careful out there.\"\n",
        npc.name,
        npc.personality,
        npc.backstory,
        npc.dialogue_style,
        npc.interests.join(", "),
    );

    if let Some(loc) = &context.location {
        let get = |key: &str| loc.get(key).cloned().unwrap_or(JsonValue::Null);
        prompt.push_str(&format!(
            "\nCURRENT SITUATION:\n\
             - Player \"{}\" is at coordinates ({}, {}, {})\n\
             - Biome: {}\n\
             - Time of day: {}\n\
             - Weather: {}\n\
             - Player health: {}/20\n",
            player,
            get("x"),
            get("y"),
            get("z"),
            get("biome"),
            get("timeOfDay"),
            get("weather"),
            get("health"),
        ));
    }

    let activity = &context.recent_activity;
    if !activity.building.is_empty() {
        prompt.push_str(&format!(
            "\n- {} has completed {} build(s) recently",
            player,
            activity.building.len()
        ));
        if let Some(last) = activity.building.last() {
            let blocks: Vec<&str> = last.blocks.iter().take(5).map(String::as_str).collect();
            prompt.push_str(&format!("\n- Recently used blocks: {}", blocks.join(", ")));
        }
    }
    if !activity.combat.is_empty() {
        prompt.push_str(&format!(
            "\n- {} has killed {} mob(s) recently",
            player,
            activity.combat.len()
        ));
        let mut mobs: Vec<&str> = activity
            .combat
            .iter()
            .rev()
            .take(5)
            .filter_map(|c| c.mob.as_deref())
            .collect();
        mobs.sort_unstable();
        mobs.dedup();
        if !mobs.is_empty() {
            prompt.push_str(&format!("\n- Recently fought: {}", mobs.join(", ")));
        }
    }

    if context.stats.blocks_placed > 0 {
        prompt.push_str(&format!(
            "\n- Total blocks placed recently: {}",
            context.stats.blocks_placed
        ));
    }
    if !context.stats.biomes_visited.is_empty() {
        prompt.push_str(&format!(
            "\n- Biomes visited: {}",
            context.stats.biomes_visited.join(", ")
        ));
    }

    prompt.push_str(&format_nearby_entities(&context.nearby_entities));

    prompt.push_str(&format!(
        "\n\n[YOUR RESPONSE]\n\
         Speak ONLY as {name}. Stay in character at ALL times.\n\n\
         Guidelines:\n\
         - Keep responses conversational (2-4 sentences usually)\n\
         - Reference your backstory and interests naturally\n\
         - React to the player's recent activity if relevant\n\
         - You can offer quests or share lore when appropriate\n\
         - Use the dialogue style specified for your character\n\
         - Comment on player's builds or combat if relevant\n\n\
         Remember: You are {name}, a living character in this world with your own goals and personality.\n\
         You are NOT an AI assistant. Never break character.\n",
        name = npc.name,
    ));

    prompt
}

fn format_nearby_entities(entities: &[JsonValue]) -> String {
    if entities.is_empty() {
        return String::new();
    }

    let mut lines = Vec::new();
    for entity in entities.iter().take(10) {
        let kind = entity.get("type").and_then(|v| v.as_str());
        let distance = entity.get("distance").cloned().unwrap_or(JsonValue::Null);
        match kind {
            Some("npc") => {
                let name = entity.get("name").and_then(|v| v.as_str()).unwrap_or("NPC");
                lines.push(format!("- {name} ({distance}m)"));
            }
            Some("player") => {
                let name = entity
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown");
                lines.push(format!("- Player: {name} ({distance}m)"));
            }
            Some("mob") => {
                let hostile = if entity
                    .get("hostile")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
                {
                    "HOSTILE"
                } else {
                    "passive"
                };
                let mob = entity
                    .get("mob_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("mob");
                lines.push(format!("- {mob} ({hostile}, {distance}m)"));
            }
            _ => {}
        }
    }

    if lines.is_empty() {
        return String::new();
    }

    format!(
        "\n[NEARBY ENTITIES]\n{}\nIMPORTANT: Adjust your tone if guards, hostile mobs, or other witnesses are present.\n",
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(dir: &std::path::Path) -> ServerConfig {
        ServerConfig::with_data_dir(dir)
    }

    fn write_npc_config(config: &ServerConfig) {
        let npcs = json!({
            "npcs": [{
                "id": "marina",
                "name": "Marina",
                "personality": "Warm, curious dockmaster",
                "backstory": "Grew up by the sea",
                "model": "llama3.1:8b",
                "interests": ["fishing", "trade"],
                "questTypes": ["exploration", "collection"],
                "dialogue_style": "warm and chatty",
                "location": {"x": 100.0, "y": 64.0, "z": -20.0, "biome": "beach"}
            }],
            "npc_templates": {
                "villager": {
                    "base_personality": "A simple villager",
                    "base_backstory": "Lives in the village",
                    "models": ["llama3.2:latest"],
                    "interests": ["farming"],
                    "quest_types": ["collection"],
                    "dialogue_style": "plain",
                    "type": "villager"
                }
            }
        });
        std::fs::write(
            config.npc_config_path(),
            serde_json::to_string(&npcs).unwrap(),
        )
        .unwrap();
    }

    fn service(dir: &std::path::Path) -> NpcService {
        let config = test_config(dir);
        write_npc_config(&config);
        NpcService::new(&config, EventLog::new(config.events_path()))
    }

    #[test]
    fn loads_static_npcs() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert_eq!(service.list().len(), 1);
        assert_eq!(service.get("marina").unwrap().name, "Marina");
        assert!(matches!(
            service.get("nobody"),
            Err(Error::NpcNotFound(_))
        ));
    }

    #[test]
    fn memory_caps_at_twenty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path());
        for i in 0..30 {
            service.add_to_memory("marina", "Steve", "user", &format!("msg {i}"));
        }
        let memory = service.memory_for("marina", "Steve");
        assert_eq!(memory.len(), MEMORY_CAP);
        assert_eq!(memory.last().unwrap().content, "msg 29");
        assert_eq!(memory.first().unwrap().content, "msg 10");
    }

    #[test]
    fn memory_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut service = service(dir.path());
            service.add_to_memory("marina", "Steve", "user", "hello");
        }
        let service = service(dir.path());
        assert_eq!(service.memory_for("marina", "Steve").len(), 1);
    }

    #[tokio::test]
    async fn template_without_models_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let npcs = json!({
            "npcs": [],
            "npc_templates": {
                "wanderer": {
                    "base_personality": "A restless drifter",
                    "base_backstory": "Never stays anywhere long",
                    "models": [],
                    "interests": ["exploration"],
                    "quest_types": ["exploration"],
                    "dialogue_style": "wistful",
                    "type": "wanderer"
                }
            }
        });
        std::fs::write(
            config.npc_config_path(),
            serde_json::to_string(&npcs).unwrap(),
        )
        .unwrap();
        let mut service = NpcService::new(&config, EventLog::new(config.events_path()));

        // Unroutable Ollama: detail generation fails fast and uses template text.
        let router = LlmRouter::from_config_file(
            &dir.path().join("llm_router.json"),
            "http://localhost:1",
        );
        let npc = service
            .create_npc(&router, "wanderer", Location::default(), Some("Ash"))
            .await
            .unwrap();

        assert_eq!(npc.model, "llama3.2:latest");
        assert_eq!(npc.name, "Ash");
        assert_eq!(npc.personality, "A restless drifter");
    }

    #[test]
    fn system_prompt_leads_with_directive() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let npc = service.get("marina").unwrap();
        let context = PlayerContext {
            player: "Steve".to_string(),
            ..PlayerContext::default()
        };

        let prompt = build_system_prompt(npc, "Steve", &context);
        assert!(prompt.starts_with("[CRITICAL DIRECTIVE - READ FIRST]"));
        assert!(prompt.contains("Name: Marina"));
        assert!(prompt.contains("Never break character."));
    }

    #[test]
    fn quest_type_follows_activity() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let mut npc = service.get("marina").unwrap().clone();
        npc.quest_types = vec!["combat".to_string(), "building".to_string()];

        let mut context = PlayerContext::default();
        context.recent_activity.combat.push(crate::events::CombatActivity {
            mob: Some("zombie".to_string()),
            timestamp: Utc::now().to_rfc3339(),
        });
        assert_eq!(NpcService::suggest_quest_type(&npc, &context), "combat");

        let calm = PlayerContext::default();
        assert_eq!(NpcService::suggest_quest_type(&npc, &calm), "combat");

        npc.quest_types.clear();
        assert_eq!(NpcService::suggest_quest_type(&npc, &calm), "exploration");
    }
}
