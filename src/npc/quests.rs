//! Quest generation, acceptance and progress tracking
//!
//! Quests are generated by the LLM (or from build challenge templates) and
//! tracked against the event log. Objectives are re-evaluated from events
//! that happened after the quest was created; completion delivers the
//! reward through the game command bridge.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::events::{EventLog, GameEvent, PlayerContext};
use crate::game::GameCommander;
use crate::llm::LlmRouter;
use crate::{store, Error, Result};

use super::challenges::{self, BuildData, ChallengeTemplate, Requirements, ValidationRules};
use super::{summarize_activity, Npc, NpcService};

/// Box half-width around an NPC that counts as "returned".
const RETURN_RADIUS: f64 = 10.0;

fn default_item_id() -> String {
    "minecraft:diamond".to_string()
}

fn default_item_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardItem {
    #[serde(default = "default_item_id")]
    pub id: String,
    #[serde(default = "default_item_count")]
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reward {
    Lore {
        #[serde(default)]
        content: String,
    },
    Items {
        #[serde(default)]
        items: Vec<RewardItem>,
    },
    Xp {
        #[serde(default)]
        amount: u32,
    },
}

impl Reward {
    pub fn kind(&self) -> &'static str {
        match self {
            Reward::Lore { .. } => "lore",
            Reward::Items { .. } => "items",
            Reward::Xp { .. } => "xp",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub npc: Option<String>,
    #[serde(default)]
    pub requirements: Option<Requirements>,
    #[serde(default)]
    pub progress: u64,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub npc_id: String,
    pub npc_name: String,
    pub player: String,
    #[serde(rename = "type")]
    pub quest_type: String,
    pub status: String,
    pub created: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(default)]
    pub reward: Option<Reward>,
    #[serde(default)]
    pub challenge_id: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub requirements: Option<Requirements>,
    #[serde(default)]
    pub validation: Option<ValidationRules>,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub accepted_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct QuestBook {
    #[serde(default)]
    pub offered: Vec<Quest>,
    #[serde(default)]
    pub active: Vec<Quest>,
    #[serde(default)]
    pub completed: Vec<Quest>,
}

/// Fields the LLM is asked to produce.
#[derive(Debug, Deserialize)]
struct GeneratedQuest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    objectives: Vec<Objective>,
    #[serde(default)]
    reward: Option<Reward>,
}

#[derive(Debug, Serialize)]
pub struct AcceptResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quest: Option<Quest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_quests: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RewardDelivery {
    pub quest_id: String,
    pub quest_title: String,
    pub reward_type: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuestUpdate {
    pub quest_id: String,
    pub title: String,
    pub status: String,
    pub updates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<Reward>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_delivered: Option<RewardDelivery>,
}

#[derive(Debug, Serialize)]
pub struct ProgressReport {
    pub player: String,
    pub active_quests: usize,
    pub completed: usize,
    pub updates: Vec<QuestUpdate>,
}

#[derive(Debug, Serialize)]
pub struct QuestStatus {
    pub active: Vec<Quest>,
    pub completed: Vec<Quest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuestLoreEntry {
    source: String,
    npc: String,
    content: String,
    discovered_at: String,
}

pub struct QuestService {
    path: PathBuf,
    lore_path: PathBuf,
    events: EventLog,
    quests: QuestBook,
}

impl QuestService {
    pub fn new(path: PathBuf, lore_path: PathBuf, events: EventLog) -> Self {
        let quests = store::load_or_default(&path, QuestBook::default);
        Self {
            path,
            lore_path,
            events,
            quests,
        }
    }

    fn save(&self) {
        store::save_best_effort(&self.path, &self.quests, "quests");
    }

    /// Ask the NPC's model for a quest shaped by the player's recent play.
    pub async fn generate_quest(
        &mut self,
        router: &LlmRouter,
        npc: &Npc,
        player: &str,
        quest_type: Option<&str>,
        context: &PlayerContext,
    ) -> Result<Quest> {
        let quest_type = quest_type
            .map(str::to_string)
            .unwrap_or_else(|| NpcService::suggest_quest_type(npc, context));

        let prompt = build_quest_prompt(npc, player, context, &quest_type);
        let generated: GeneratedQuest = serde_json::from_value(
            router.generate_json(&npc.model, &prompt).await?,
        )?;

        let quest = Quest {
            id: format!("{}_{}_{}", npc.id, player, Utc::now().timestamp_millis()),
            npc_id: npc.id.clone(),
            npc_name: npc.name.clone(),
            player: player.to_string(),
            quest_type,
            status: "active".to_string(),
            created: Utc::now().to_rfc3339(),
            title: generated.title,
            description: generated.description,
            objectives: generated.objectives,
            reward: generated.reward,
            challenge_id: None,
            difficulty: None,
            requirements: None,
            validation: None,
            accepted: false,
            accepted_at: None,
            completed_at: None,
        };

        self.quests.active.push(quest.clone());
        self.save();
        Ok(quest)
    }

    /// Turn a build challenge template into an active quest. Without an
    /// explicit challenge id, one suitable for the NPC is picked at random.
    pub fn generate_challenge_quest(
        &mut self,
        npc: &Npc,
        templates: &[ChallengeTemplate],
        player: &str,
        challenge_id: Option<&str>,
    ) -> Result<Quest> {
        let suitable: Vec<&ChallengeTemplate> =
            templates.iter().filter(|c| c.suits(&npc.id)).collect();

        let challenge = match challenge_id {
            Some(id) => suitable
                .iter()
                .find(|c| c.id == id)
                .copied()
                .ok_or_else(|| {
                    Error::QuestNotFound(format!("challenge '{id}' not suitable for {}", npc.id))
                })?,
            None => *suitable
                .choose(&mut rand::thread_rng())
                .ok_or_else(|| {
                    Error::QuestNotFound(format!("no suitable build challenges for {}", npc.id))
                })?,
        };

        let quest = Quest {
            id: format!(
                "{}_{}_challenge_{}",
                npc.id,
                player,
                Utc::now().timestamp_millis()
            ),
            npc_id: npc.id.clone(),
            npc_name: npc.name.clone(),
            player: player.to_string(),
            quest_type: "build_challenge".to_string(),
            status: "active".to_string(),
            created: Utc::now().to_rfc3339(),
            title: challenge.title.clone(),
            description: challenge.description.clone(),
            objectives: vec![
                Objective {
                    kind: "build_blocks".to_string(),
                    target: None,
                    count: None,
                    npc: None,
                    requirements: Some(challenge.requirements.clone()),
                    progress: 0,
                    completed: false,
                },
                Objective {
                    kind: "return_to_npc".to_string(),
                    target: None,
                    count: None,
                    npc: Some(npc.id.clone()),
                    requirements: None,
                    progress: 0,
                    completed: false,
                },
            ],
            reward: Some(challenge.reward.clone()),
            challenge_id: Some(challenge.id.clone()),
            difficulty: Some(challenge.difficulty.clone()),
            requirements: Some(challenge.requirements.clone()),
            validation: Some(challenge.validation.clone()),
            accepted: false,
            accepted_at: None,
            completed_at: None,
        };

        self.quests.active.push(quest.clone());
        self.save();
        Ok(quest)
    }

    /// Accept an offered quest, or confirm an already-active one. Accepting
    /// twice is not an error.
    pub fn accept(&mut self, player: &str, quest_id: &str) -> AcceptResult {
        if let Some(index) = self
            .quests
            .offered
            .iter()
            .position(|q| q.id == quest_id && q.player == player)
        {
            let mut quest = self.quests.offered.remove(index);
            quest.status = "active".to_string();
            quest.accepted = true;
            quest.accepted_at = Some(Utc::now().to_rfc3339());
            let message = format!("Quest '{}' accepted!", quest.title);
            self.quests.active.push(quest.clone());
            self.save();
            return AcceptResult {
                success: true,
                action: Some("accepted".to_string()),
                message,
                quest: Some(quest),
                available_quests: Vec::new(),
            };
        }

        if let Some(quest) = self
            .quests
            .active
            .iter_mut()
            .find(|q| q.id == quest_id && q.player == player)
        {
            quest.accepted = true;
            if quest.accepted_at.is_none() {
                quest.accepted_at = Some(Utc::now().to_rfc3339());
            }
            let result = AcceptResult {
                success: true,
                action: Some("confirmed".to_string()),
                message: format!("Quest '{}' is already active.", quest.title),
                quest: Some(quest.clone()),
                available_quests: Vec::new(),
            };
            self.save();
            return result;
        }

        AcceptResult {
            success: false,
            action: None,
            message: format!("Quest '{quest_id}' not found for player '{player}'"),
            quest: None,
            available_quests: self
                .quests
                .active
                .iter()
                .filter(|q| q.player == player)
                .map(|q| q.id.clone())
                .collect(),
        }
    }

    pub fn status(&self, player: &str) -> QuestStatus {
        QuestStatus {
            active: self
                .quests
                .active
                .iter()
                .filter(|q| q.player == player)
                .cloned()
                .collect(),
            completed: self
                .quests
                .completed
                .iter()
                .filter(|q| q.player == player)
                .cloned()
                .collect(),
        }
    }

    /// Validate a finished build against an active build challenge quest.
    pub fn validate_challenge(
        &self,
        player: &str,
        quest_id: &str,
        build: &BuildData,
    ) -> Result<challenges::ValidationReport> {
        let quest = self
            .quests
            .active
            .iter()
            .find(|q| q.id == quest_id && q.player == player && q.quest_type == "build_challenge")
            .ok_or_else(|| {
                Error::QuestNotFound(format!("'{quest_id}' is not an active build challenge"))
            })?;

        let empty_requirements = Requirements::default();
        let empty_rules = ValidationRules::default();
        Ok(challenges::validate_build(
            &quest.id,
            quest.challenge_id.as_deref(),
            quest.requirements.as_ref().unwrap_or(&empty_requirements),
            quest.validation.as_ref().unwrap_or(&empty_rules),
            build,
        ))
    }

    /// Re-evaluate every active quest for the player against events recorded
    /// since the quest was created, completing and rewarding as appropriate.
    pub async fn check_progress(
        &mut self,
        player: &str,
        npcs: &HashMap<String, Npc>,
        game: &GameCommander,
    ) -> ProgressReport {
        let active_count = self
            .quests
            .active
            .iter()
            .filter(|q| q.player == player)
            .count();
        if active_count == 0 {
            return ProgressReport {
                player: player.to_string(),
                active_quests: 0,
                completed: 0,
                updates: Vec::new(),
            };
        }

        let events = self.events.load();
        let mut updates = Vec::new();
        let mut completed_ids = Vec::new();

        for quest in self
            .quests
            .active
            .iter_mut()
            .filter(|q| q.player == player)
        {
            let since = DateTime::parse_from_rfc3339(&quest.created)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            let relevant: Vec<&GameEvent> = events
                .iter()
                .filter(|e| e.player_name() == Some(player))
                .filter(|e| e.time().map(|t| t > since).unwrap_or(false))
                .collect();

            let mut quest_updates = Vec::new();
            let mut all_complete = true;

            for objective in &mut quest.objectives {
                if objective.completed {
                    continue;
                }
                if !check_objective(objective, &relevant, npcs, &mut quest_updates) {
                    all_complete = false;
                }
            }

            if all_complete && !quest.objectives.is_empty() {
                quest.status = "completed".to_string();
                quest.completed_at = Some(Utc::now().to_rfc3339());
                completed_ids.push(quest.id.clone());

                let delivery =
                    deliver_reward(&self.lore_path, game, player, quest).await;
                updates.push(QuestUpdate {
                    quest_id: quest.id.clone(),
                    title: quest.title.clone(),
                    status: "completed".to_string(),
                    updates: quest_updates,
                    reward: quest.reward.clone(),
                    reward_delivered: Some(delivery),
                });
            } else if !quest_updates.is_empty() {
                updates.push(QuestUpdate {
                    quest_id: quest.id.clone(),
                    title: quest.title.clone(),
                    status: "in_progress".to_string(),
                    updates: quest_updates,
                    reward: None,
                    reward_delivered: None,
                });
            }
        }

        for id in &completed_ids {
            if let Some(index) = self.quests.active.iter().position(|q| &q.id == id) {
                let quest = self.quests.active.remove(index);
                self.quests.completed.push(quest);
            }
        }
        self.save();

        ProgressReport {
            player: player.to_string(),
            active_quests: active_count - completed_ids.len(),
            completed: completed_ids.len(),
            updates,
        }
    }
}

fn build_quest_prompt(npc: &Npc, player: &str, context: &PlayerContext, quest_type: &str) -> String {
    let biome = context.biome().unwrap_or("unknown");
    format!(
        "You are {name}, and you want to give {player} a quest.\n\n\
         Based on what you've observed:\n\
         - Player has been {activity}\n\
         - Current location: {biome} biome\n\
         - Quest type: {quest_type}\n\n\
         Generate a quest that fits your personality and the player's recent activity.\n\n\
         Return ONLY valid JSON in this exact format:\n\
         {{\n\
           \"title\": \"Quest Title\",\n\
           \"description\": \"A narrative description of the quest (2-3 sentences, in character)\",\n\
           \"objectives\": [\n\
             {{\"type\": \"kill_mobs\", \"target\": \"zombie\", \"count\": 10}},\n\
             {{\"type\": \"return_to_npc\", \"npc\": \"{npc_id}\"}}\n\
           ],\n\
           \"reward\": {{\n\
             \"type\": \"lore\",\n\
             \"content\": \"A piece of lore or knowledge you'll share (1-2 sentences)\"\n\
           }}\n\
         }}\n\n\
         Make the quest interesting and tied to your character's interests: {interests}\n",
        name = npc.name,
        player = player,
        activity = summarize_activity(context),
        biome = biome,
        quest_type = quest_type,
        npc_id = npc.id,
        interests = npc.interests.join(", "),
    )
}

/// Returns true when the objective is (now) complete.
fn check_objective(
    objective: &mut Objective,
    events: &[&GameEvent],
    npcs: &HashMap<String, Npc>,
    updates: &mut Vec<String>,
) -> bool {
    let target = objective.target.clone().unwrap_or_default().to_lowercase();
    let count = objective.count.unwrap_or(1);

    match objective.kind.as_str() {
        "kill_mobs" => {
            let kills = events
                .iter()
                .filter(|e| e.event_type == "mob_killed")
                .filter(|e| {
                    e.data
                        .get("mobType")
                        .and_then(|v| v.as_str())
                        .map(|m| m.to_lowercase().contains(&target))
                        .unwrap_or(false)
                })
                .count() as u64;
            objective.progress = kills;
            if kills >= count {
                objective.completed = true;
                updates.push(format!("Killed {count} {target}(s)"));
            }
        }
        "collect_items" => {
            let latest = events
                .iter()
                .filter(|e| e.event_type == "inventory_snapshot")
                .last();
            match latest {
                Some(snapshot) => {
                    let held: u64 = snapshot
                        .data
                        .get("inventory")
                        .and_then(|v| v.as_array())
                        .map(|items| {
                            items
                                .iter()
                                .filter(|i| {
                                    i.get("item")
                                        .and_then(|v| v.as_str())
                                        .map(|name| name.to_lowercase().contains(&target))
                                        .unwrap_or(false)
                                })
                                .filter_map(|i| i.get("count").and_then(|v| v.as_u64()))
                                .sum()
                        })
                        .unwrap_or(0);
                    objective.progress = held;
                    if held >= count {
                        objective.completed = true;
                        updates.push(format!("Collected {count} {target}(s)"));
                    }
                }
                None => {}
            }
        }
        "visit_biome" => {
            let visited = events.iter().any(|e| {
                e.event_type == "player_state"
                    && e.data
                        .get("biome")
                        .and_then(|v| v.as_str())
                        .map(|b| b.to_lowercase().contains(&target))
                        .unwrap_or(false)
            });
            if visited {
                objective.completed = true;
                objective.progress = 1;
                updates.push(format!("Visited {target} biome"));
            }
        }
        "build_blocks" => {
            let total: u64 = events
                .iter()
                .filter(|e| e.event_type == "build_complete")
                .map(|e| {
                    let counts = e.data.get("blockCounts").and_then(|v| v.as_object());
                    match (counts, objective.target.as_deref()) {
                        (Some(counts), Some(block_type)) => counts
                            .get(block_type)
                            .and_then(|v| v.as_u64())
                            .unwrap_or(0),
                        (Some(counts), None) => {
                            counts.values().filter_map(JsonValue::as_u64).sum()
                        }
                        (None, _) => 0,
                    }
                })
                .sum();
            objective.progress = total;
            if total >= count {
                objective.completed = true;
                updates.push(format!("Placed {count} blocks"));
            }
        }
        "return_to_npc" => {
            let near = objective
                .npc
                .as_deref()
                .and_then(|id| npcs.get(id))
                .and_then(|npc| npc.location.as_ref().map(|loc| (npc.name.clone(), loc)))
                .map(|(name, loc)| {
                    let reached = events
                        .iter()
                        .filter(|e| e.event_type == "player_state")
                        .any(|e| {
                            let coord = |key: &str| {
                                e.data.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
                            };
                            (coord("x") - loc.x).abs() <= RETURN_RADIUS
                                && (coord("y") - loc.y).abs() <= RETURN_RADIUS
                                && (coord("z") - loc.z).abs() <= RETURN_RADIUS
                        });
                    (name, reached)
                });
            if let Some((name, true)) = near {
                objective.completed = true;
                objective.progress = 1;
                updates.push(format!("Returned to {name}"));
            }
        }
        _ => {}
    }

    objective.completed
}

async fn deliver_reward(
    lore_path: &PathBuf,
    game: &GameCommander,
    player: &str,
    quest: &Quest,
) -> RewardDelivery {
    let mut delivery = RewardDelivery {
        quest_id: quest.id.clone(),
        quest_title: quest.title.clone(),
        reward_type: quest
            .reward
            .as_ref()
            .map(|r| r.kind().to_string())
            .unwrap_or_else(|| "none".to_string()),
        delivered: false,
        content: None,
        reason: None,
    };

    let Some(reward) = &quest.reward else {
        delivery.reason = Some("No reward defined".to_string());
        return delivery;
    };

    match reward {
        Reward::Lore { content } if !content.is_empty() => {
            let mut discovered: HashMap<String, Vec<QuestLoreEntry>> =
                store::load_or_default(lore_path, HashMap::new);
            discovered
                .entry(player.to_string())
                .or_default()
                .push(QuestLoreEntry {
                    source: format!("quest:{}", quest.id),
                    npc: quest.npc_name.clone(),
                    content: content.clone(),
                    discovered_at: Utc::now().to_rfc3339(),
                });
            store::save_best_effort(lore_path, &discovered, "quest lore");

            game.send_chat(
                player,
                &format!("[Quest Complete] {} shares: {}", quest.npc_name, content),
            )
            .await;
            delivery.delivered = true;
            delivery.content = Some(content.clone());
        }
        Reward::Lore { .. } => {
            delivery.reason = Some("Empty lore reward".to_string());
        }
        Reward::Items { items } if !items.is_empty() => {
            for item in items {
                game.give_item(player, &item.id, item.count).await;
            }
            delivery.delivered = true;
        }
        Reward::Items { .. } => {
            delivery.reason = Some("No items in reward".to_string());
        }
        Reward::Xp { amount } if *amount > 0 => {
            game.give_xp(player, *amount).await;
            delivery.delivered = true;
        }
        Reward::Xp { .. } => {
            delivery.reason = Some("Zero xp reward".to_string());
        }
    }

    delivery
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn npc(id: &str, x: f64) -> Npc {
        Npc {
            id: id.to_string(),
            name: "Marina".to_string(),
            personality: "warm".to_string(),
            backstory: "dockmaster".to_string(),
            model: "llama3.1:8b".to_string(),
            location: Some(super::super::Location {
                x,
                y: 64.0,
                z: 0.0,
                dimension: None,
                biome: None,
            }),
            interests: vec!["fishing".to_string()],
            quest_types: vec!["exploration".to_string()],
            appearance: None,
            skin: None,
            dialogue_style: "warm".to_string(),
            is_dynamic: false,
            template_id: None,
            created_at: None,
        }
    }

    fn quest(player: &str, objectives: Vec<Objective>) -> Quest {
        Quest {
            id: "q1".to_string(),
            npc_id: "marina".to_string(),
            npc_name: "Marina".to_string(),
            player: player.to_string(),
            quest_type: "combat".to_string(),
            status: "active".to_string(),
            created: (Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
            title: "Cull the Dead".to_string(),
            description: "Thin the zombie herd.".to_string(),
            objectives,
            reward: Some(Reward::Lore {
                content: "The sea remembers.".to_string(),
            }),
            challenge_id: None,
            difficulty: None,
            requirements: None,
            validation: None,
            accepted: false,
            accepted_at: None,
            completed_at: None,
        }
    }

    fn objective(kind: &str, target: Option<&str>, count: Option<u64>) -> Objective {
        Objective {
            kind: kind.to_string(),
            target: target.map(str::to_string),
            count,
            npc: None,
            requirements: None,
            progress: 0,
            completed: false,
        }
    }

    fn service(dir: &std::path::Path, events: serde_json::Value) -> QuestService {
        let events_path = dir.join("minecraft_events.json");
        std::fs::write(&events_path, serde_json::to_string(&events).unwrap()).unwrap();
        QuestService::new(
            dir.join("quests.json"),
            dir.join("quest_lore.json"),
            EventLog::new(events_path),
        )
    }

    fn kill_event(mob: &str) -> serde_json::Value {
        json!({"eventType": "mob_killed", "timestamp": Utc::now().to_rfc3339(),
               "data": {"playerName": "Steve", "mobType": mob}})
    }

    #[tokio::test]
    async fn kill_objective_completes_and_rewards_lore() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(
            dir.path(),
            json!([kill_event("zombie"), kill_event("zombie"), kill_event("baby_zombie")]),
        );
        service
            .quests
            .active
            .push(quest("Steve", vec![objective("kill_mobs", Some("zombie"), Some(3))]));

        let npcs = HashMap::new();
        let game = GameCommander::new("http://localhost:1");
        let report = service.check_progress("Steve", &npcs, &game).await;

        assert_eq!(report.completed, 1);
        assert_eq!(report.active_quests, 0);
        assert_eq!(report.updates[0].status, "completed");
        let delivery = report.updates[0].reward_delivered.as_ref().unwrap();
        assert!(delivery.delivered);
        assert_eq!(service.quests.completed.len(), 1);
        assert!(service.quests.active.is_empty());

        let lore: HashMap<String, Vec<QuestLoreEntry>> =
            store::load_or_default(&dir.path().join("quest_lore.json"), HashMap::new);
        assert_eq!(lore["Steve"][0].content, "The sea remembers.");
    }

    #[tokio::test]
    async fn partial_progress_stays_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path(), json!([kill_event("zombie")]));
        service
            .quests
            .active
            .push(quest("Steve", vec![objective("kill_mobs", Some("zombie"), Some(5))]));

        let report = service
            .check_progress("Steve", &HashMap::new(), &GameCommander::new("http://localhost:1"))
            .await;

        assert_eq!(report.completed, 0);
        assert_eq!(report.active_quests, 1);
        assert_eq!(service.quests.active[0].objectives[0].progress, 1);
    }

    #[tokio::test]
    async fn return_objective_uses_npc_location() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(
            dir.path(),
            json!([
                {"eventType": "player_state", "timestamp": Utc::now().to_rfc3339(),
                 "data": {"playerName": "Steve", "x": 105.0, "y": 64.0, "z": 3.0}}
            ]),
        );
        let mut q = quest("Steve", vec![objective("return_to_npc", None, None)]);
        q.objectives[0].npc = Some("marina".to_string());
        service.quests.active.push(q);

        let mut npcs = HashMap::new();
        npcs.insert("marina".to_string(), npc("marina", 100.0));

        let report = service
            .check_progress("Steve", &npcs, &GameCommander::new("http://localhost:1"))
            .await;
        assert_eq!(report.completed, 1);
        assert!(report.updates[0].updates[0].contains("Returned to Marina"));
    }

    #[test]
    fn accept_moves_offered_to_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path(), json!([]));
        let mut q = quest("Steve", Vec::new());
        q.status = "offered".to_string();
        service.quests.offered.push(q);

        let result = service.accept("Steve", "q1");
        assert!(result.success);
        assert_eq!(result.action.as_deref(), Some("accepted"));
        assert!(service.quests.offered.is_empty());
        assert_eq!(service.quests.active[0].status, "active");
        assert!(service.quests.active[0].accepted);

        // Accepting again just confirms.
        let confirm = service.accept("Steve", "q1");
        assert!(confirm.success);
        assert_eq!(confirm.action.as_deref(), Some("confirmed"));
    }

    #[test]
    fn accept_unknown_quest_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path(), json!([]));
        service.quests.active.push(quest("Steve", Vec::new()));

        let result = service.accept("Steve", "missing");
        assert!(!result.success);
        assert_eq!(result.available_quests, vec!["q1"]);
    }

    #[test]
    fn challenge_quest_from_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path(), json!([]));
        let template = ChallengeTemplate {
            id: "lighthouse".to_string(),
            title: "A Light for the Harbor".to_string(),
            description: "Build a lighthouse the ships can see.".to_string(),
            difficulty: "hard".to_string(),
            giver_affinity: vec!["marina".to_string()],
            requirements: Requirements {
                min_blocks: 100,
                min_height: 15,
                required_block_types: Default::default(),
            },
            reward: Reward::Xp { amount: 100 },
            validation: ValidationRules::default(),
        };

        let quest = service
            .generate_challenge_quest(&npc("marina", 0.0), &[template], "Steve", Some("lighthouse"))
            .unwrap();
        assert_eq!(quest.quest_type, "build_challenge");
        assert_eq!(quest.objectives.len(), 2);
        assert_eq!(quest.objectives[1].kind, "return_to_npc");

        // Wrong NPC gets nothing.
        let err = service.generate_challenge_quest(&npc("vex", 0.0), &[], "Steve", None);
        assert!(err.is_err());
    }

    #[test]
    fn validate_challenge_requires_active_challenge_quest() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), json!([]));
        let err = service.validate_challenge("Steve", "q1", &BuildData::default());
        assert!(matches!(err, Err(Error::QuestNotFound(_))));
    }

    #[test]
    fn status_filters_by_player() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path(), json!([]));
        service.quests.active.push(quest("Steve", Vec::new()));
        let mut other = quest("Alex", Vec::new());
        other.id = "q2".to_string();
        service.quests.active.push(other);

        let status = service.status("Steve");
        assert_eq!(status.active.len(), 1);
        assert_eq!(status.active[0].id, "q1");
    }
}
