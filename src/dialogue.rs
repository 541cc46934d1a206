//! Dialogue wheel with relationships
//!
//! Generates RPG-style dialogue options per interaction: an instant
//! personality template for first contact, LLM-generated options once there
//! is history, and deterministic fallbacks when the model fails. A
//! relationship ledger per (npc, player) pair shapes tone and options.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::events::PlayerContext;
use crate::llm::LlmRouter;
use crate::lore::LoreService;
use crate::npc::quests::QuestService;
use crate::npc::{Npc, NpcService};
use crate::{store, Error, Result};

const MEMORABLE_ACTIONS_CAP: usize = 20;
const DIALOGUE_CHOICES_CAP: usize = 50;

/// Model used for option generation; kept small for latency.
const OPTIONS_MODEL: &str = "llama3.2:latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorableAction {
    pub action: String,
    pub delta: i32,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueChoice {
    pub option_id: u32,
    pub text: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub level: i32,
    pub title: String,
    pub interactions: u64,
    pub quests_completed: u64,
    pub last_interaction: Option<String>,
    #[serde(default)]
    pub memorable_actions: Vec<MemorableAction>,
    #[serde(default)]
    pub dialogue_choices: Vec<DialogueChoice>,
}

impl Default for Relationship {
    fn default() -> Self {
        Self {
            level: 0,
            title: "Stranger".to_string(),
            interactions: 0,
            quests_completed: 0,
            last_interaction: None,
            memorable_actions: Vec::new(),
            dialogue_choices: Vec::new(),
        }
    }
}

pub fn title_for_level(level: i32) -> &'static str {
    if level >= 80 {
        "Trusted Ally"
    } else if level >= 50 {
        "Friend"
    } else if level >= 20 {
        "Acquaintance"
    } else if level >= -20 {
        "Stranger"
    } else if level >= -50 {
        "Distrusted"
    } else {
        "Enemy"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueOption {
    pub id: u32,
    pub text: String,
    pub tone: String,
    #[serde(default)]
    pub relationship_delta: i32,
    #[serde(default)]
    pub leads_to: String,
}

impl DialogueOption {
    fn new(id: u32, text: &str, tone: &str, delta: i32, leads_to: &str) -> Self {
        Self {
            id,
            text: text.to_string(),
            tone: tone.to_string(),
            relationship_delta: delta,
            leads_to: leads_to.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipSummary {
    pub level: i32,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct DialogueSet {
    pub npc_id: String,
    pub npc_name: String,
    pub player: String,
    pub relationship: RelationshipSummary,
    pub greeting: String,
    pub options: Vec<DialogueOption>,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectionResult {
    pub npc_id: String,
    pub player: String,
    pub player_choice: String,
    pub npc_response: String,
    pub relationship_change: i32,
    pub new_relationship: RelationshipSummary,
}

#[derive(Debug, Serialize)]
pub struct DialogueTurn {
    pub npc_id: String,
    pub conversation_id: String,
    pub npc_response: String,
    pub conversation_ended: bool,
    pub new_options: Vec<DialogueOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockItem {
    pub item: String,
    pub quantity: u32,
    pub price_buy: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MerchantInventory {
    #[serde(default)]
    pub stock: Vec<StockItem>,
}

/// What the LLM is asked to return for an options request.
#[derive(Debug, Deserialize)]
struct GeneratedOptions {
    #[serde(default)]
    greeting: Option<String>,
    #[serde(default)]
    options: Vec<DialogueOption>,
}

pub struct DialogueService {
    relationships_path: PathBuf,
    relationships: HashMap<String, Relationship>,
    merchant_inventory: HashMap<String, MerchantInventory>,
}

impl DialogueService {
    pub fn new(relationships_path: PathBuf, merchant_inventory_path: PathBuf) -> Self {
        let relationships = store::load_or_default(&relationships_path, HashMap::new);
        let merchant_inventory = store::load_or_default(&merchant_inventory_path, HashMap::new);
        Self {
            relationships_path,
            relationships,
            merchant_inventory,
        }
    }

    fn save(&self) {
        store::save_best_effort(&self.relationships_path, &self.relationships, "relationships");
    }

    pub fn relationship(&mut self, npc_id: &str, player: &str) -> &mut Relationship {
        self.relationships
            .entry(format!("{npc_id}:{player}"))
            .or_default()
    }

    pub fn update_relationship(
        &mut self,
        npc_id: &str,
        player: &str,
        delta: i32,
        reason: Option<&str>,
    ) {
        let rel = self.relationship(npc_id, player);
        rel.level = (rel.level + delta).clamp(-100, 100);
        rel.interactions += 1;
        rel.last_interaction = Some(Utc::now().to_rfc3339());
        rel.title = title_for_level(rel.level).to_string();

        if let Some(reason) = reason {
            rel.memorable_actions.push(MemorableAction {
                action: reason.to_string(),
                delta,
                timestamp: Utc::now().to_rfc3339(),
            });
            if rel.memorable_actions.len() > MEMORABLE_ACTIONS_CAP {
                let excess = rel.memorable_actions.len() - MEMORABLE_ACTIONS_CAP;
                rel.memorable_actions.drain(..excess);
            }
        }

        self.save();
    }

    /// Generate dialogue options for an interaction. First contact with no
    /// history skips the LLM entirely.
    pub async fn generate_options(
        &mut self,
        router: &LlmRouter,
        npcs: &NpcService,
        quests: &QuestService,
        lore: &LoreService,
        npc_id: &str,
        player: &str,
        context_type: &str,
    ) -> Result<DialogueSet> {
        let npc = npcs.get(npc_id)?.clone();
        let relationship = self.relationship(npc_id, player).clone();

        let memory = npcs.memory_for(npc_id, player);
        let npc_quests: Vec<_> = quests
            .status(player)
            .active
            .into_iter()
            .filter(|q| q.npc_id == npc_id)
            .collect();

        if context_type == "greeting" && memory.is_empty() && npc_quests.is_empty() {
            tracing::debug!("Using greeting template for {} (no history)", npc_id);
            return Ok(greeting_template(&npc, player, &relationship));
        }

        let context = npcs.player_context(player, Vec::new());
        let prompt = self.build_options_prompt(
            &npc,
            player,
            &relationship,
            &context,
            memory,
            &npc_quests,
            lore,
            context_type,
        );

        let generated = match router.generate_json(OPTIONS_MODEL, &prompt).await {
            Ok(value) => serde_json::from_value::<GeneratedOptions>(value).map_err(Error::from),
            Err(e) => Err(e),
        };

        match generated {
            Ok(generated) => {
                Ok(DialogueSet {
                    npc_id: npc.id.clone(),
                    npc_name: npc.name.clone(),
                    player: player.to_string(),
                    relationship: RelationshipSummary {
                        level: relationship.level,
                        title: relationship.title.clone(),
                    },
                    greeting: generated
                        .greeting
                        .unwrap_or_else(|| format!("{} looks at you.", npc.name)),
                    options: generated.options,
                    context: context_type.to_string(),
                    note: None,
                    conversation_id: None,
                })
            }
            Err(e) => {
                tracing::error!("Error generating options: {}", e);
                Ok(fallback_options(&npc, player, &relationship, context_type))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_options_prompt(
        &self,
        npc: &Npc,
        player: &str,
        relationship: &Relationship,
        context: &PlayerContext,
        memory: &[crate::npc::MemoryEntry],
        active_quests: &[crate::npc::quests::Quest],
        lore: &LoreService,
        context_type: &str,
    ) -> String {
        let recent_memory = if memory.is_empty() {
            "First meeting".to_string()
        } else {
            memory
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|m| {
                    let preview: String = m.content.chars().take(100).collect();
                    format!("- {}: {}...", m.role, preview)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let memorable = if relationship.memorable_actions.is_empty() {
            "None yet".to_string()
        } else {
            relationship
                .memorable_actions
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|a| {
                    let sign = if a.delta > 0 { "+" } else { "" };
                    format!("- {} (relationship {}{})", a.action, sign, a.delta)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let discovered = lore.discovered_for_npc(player);
        let lore_summary = if discovered.is_empty() {
            "None discovered yet".to_string()
        } else {
            discovered
                .iter()
                .take(10)
                .map(|l| format!("- {} ({})", l.title, l.category))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut prompt = format!(
            "You are generating dialogue options for a Baldur's Gate 3 style RPG interaction.\n\n\
             NPC: {}\n\
             Personality: {}\n\
             Dialogue Style: {}\n\n\
             PLAYER: {}\n\
             Relationship: {} (level {}/100)\n\
             Interactions: {}\n\n\
             RECENT CONVERSATION:\n{}\n\n\
             MEMORABLE PLAYER ACTIONS:\n{}\n\n\
             PLAYER'S RECENT ACTIVITY:\n{}\n\n\
             PLAYER'S DISCOVERED LORE (shared knowledge - NPC can reference these topics):\n{}\n",
            npc.name,
            npc.personality,
            npc.dialogue_style,
            player,
            relationship.title,
            relationship.level,
            relationship.interactions,
            recent_memory,
            memorable,
            summarize_context(context),
            lore_summary,
        );

        if let Some(inventory) = self.merchant_inventory.get(&npc.id) {
            if !inventory.stock.is_empty() {
                let items = inventory
                    .stock
                    .iter()
                    .map(|i| {
                        format!(
                            "- {}: {} available @ {} emeralds each",
                            i.item, i.quantity, i.price_buy
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                prompt.push_str(&format!(
                    "\nMERCHANT INVENTORY:\n{items}\n\n\
                     IMPORTANT: Only offer items you have in stock. Check quantities before mentioning trades.\n"
                ));
            }
        }

        let quests_json = if active_quests.is_empty() {
            "None".to_string()
        } else {
            serde_json::to_string_pretty(active_quests).unwrap_or_else(|_| "None".to_string())
        };

        prompt.push_str(&format!(
            "\nACTIVE QUESTS FROM THIS NPC:\n{quests_json}\n\n\
             CONTEXT: {context_type}\n\n\
             Generate a dialogue interaction with 3-5 options. Each option should:\n\
             1. Fit the player's relationship level with the NPC\n\
             2. Reference recent activity or past conversations when relevant\n\
             3. Include different tones (friendly, neutral, aggressive, curious)\n\
             4. Some options may affect relationship\n\n\
             Return JSON in this exact format:\n\
             {{\n\
               \"greeting\": \"What the NPC says when the player approaches (1-2 sentences, in character)\",\n\
               \"options\": [\n\
                 {{\n\
                   \"id\": 1,\n\
                   \"text\": \"What the player can say\",\n\
                   \"tone\": \"friendly/neutral/aggressive/curious/flirty/intimidating\",\n\
                   \"relationship_delta\": -5 to +5 (0 for neutral),\n\
                   \"leads_to\": \"response/quest/trade/farewell/combat\"\n\
                 }}\n\
               ]\n\
             }}\n\n\
             Make options feel natural and reactive to the context. High relationship = more friendly options available. Low relationship = more hostile options."
        ));

        prompt
    }

    /// Apply a chosen option: relationship update, choice history, then an
    /// in-character response from the NPC.
    pub async fn select_option(
        &mut self,
        router: &LlmRouter,
        npcs: &mut NpcService,
        npc_id: &str,
        player: &str,
        option_id: u32,
        option_text: &str,
        relationship_delta: i32,
        nearby_entities: Vec<JsonValue>,
    ) -> Result<SelectionResult> {
        if relationship_delta != 0 {
            let preview: String = option_text.chars().take(50).collect();
            self.update_relationship(
                npc_id,
                player,
                relationship_delta,
                Some(&format!("Dialogue choice: {preview}")),
            );
        }

        let rel = self.relationship(npc_id, player);
        rel.dialogue_choices.push(DialogueChoice {
            option_id,
            text: option_text.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });
        if rel.dialogue_choices.len() > DIALOGUE_CHOICES_CAP {
            let excess = rel.dialogue_choices.len() - DIALOGUE_CHOICES_CAP;
            rel.dialogue_choices.drain(..excess);
        }
        let summary = RelationshipSummary {
            level: rel.level,
            title: rel.title.clone(),
        };
        self.save();

        let context = npcs.player_context(player, nearby_entities);
        let response = npcs
            .generate_response(router, npc_id, player, option_text, Some(context))
            .await?;
        let response = sanitize_npc_response(&response);

        Ok(SelectionResult {
            npc_id: npc_id.to_string(),
            player: player.to_string(),
            player_choice: option_text.to_string(),
            npc_response: response,
            relationship_change: relationship_delta,
            new_relationship: summary,
        })
    }

    /// Start an LLM-driven dialogue session: fresh conversation id plus the
    /// opening options.
    pub async fn start_dialogue(
        &mut self,
        router: &LlmRouter,
        npcs: &NpcService,
        quests: &QuestService,
        lore: &LoreService,
        npc_id: &str,
        player: &str,
    ) -> Result<DialogueSet> {
        let mut set = self
            .generate_options(router, npcs, quests, lore, npc_id, player, "greeting")
            .await?;
        set.conversation_id = Some(Uuid::new_v4().to_string());
        Ok(set)
    }

    /// One player turn in an ongoing conversation: apply the choice, detect
    /// farewells, and produce the next set of options if it continues.
    #[allow(clippy::too_many_arguments)]
    pub async fn respond(
        &mut self,
        router: &LlmRouter,
        npcs: &mut NpcService,
        quests: &QuestService,
        lore: &LoreService,
        conversation_id: &str,
        npc_id: &str,
        player: &str,
        option_text: &str,
    ) -> Result<DialogueTurn> {
        let selection = self
            .select_option(router, npcs, npc_id, player, 0, option_text, 0, Vec::new())
            .await?;
        let response = selection.npc_response;

        let lower = response.to_lowercase();
        let conversation_ended = ["goodbye", "farewell", "safe travels"]
            .iter()
            .any(|k| lower.contains(k));

        let new_options = if conversation_ended {
            Vec::new()
        } else {
            self.generate_options(router, npcs, quests, lore, npc_id, player, "conversation_turn")
                .await?
                .options
        };

        Ok(DialogueTurn {
            npc_id: npc_id.to_string(),
            conversation_id: conversation_id.to_string(),
            npc_response: response,
            conversation_ended,
            new_options,
        })
    }
}

fn summarize_context(context: &PlayerContext) -> String {
    let mut parts = Vec::new();
    let stats = &context.stats;

    if stats.blocks_placed > 0 {
        parts.push(format!("Built {} blocks recently", stats.blocks_placed));
    }
    if stats.mobs_killed > 0 {
        parts.push(format!("Killed {} mobs", stats.mobs_killed));
    }
    if !stats.biomes_visited.is_empty() {
        parts.push(format!("Visited {} biomes", stats.biomes_visited.len()));
    }
    if let Some(location) = &context.location {
        let biome = location
            .get("biome")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        parts.push(format!("Currently in {biome} biome"));
        if location
            .get("health")
            .and_then(|v| v.as_f64())
            .unwrap_or(20.0)
            < 10.0
        {
            parts.push("Low health".to_string());
        }
    }

    if parts.is_empty() {
        "Just exploring".to_string()
    } else {
        parts.join("\n")
    }
}

/// Instant first-contact greeting with stock options, no LLM round trip.
fn greeting_template(npc: &Npc, player: &str, relationship: &Relationship) -> DialogueSet {
    let level = relationship.level;
    let tone = if level >= 50 {
        2
    } else if level >= 20 {
        1
    } else {
        0
    };

    let name = &npc.name;
    let greetings: Option<[String; 3]> = match npc.id.as_str() {
        "marina" => Some([
            format!("{name} looks up from mending nets. The sea's calm today."),
            format!("Ahoy, {player}! The tides brought you here at the right time."),
            format!("{player}, my friend! The ocean whispers your name today."),
        ]),
        "vex" => Some([
            format!("{name} stares through you, seeing... something else."),
            format!("You again. The dimensions align when you're near, {player}."),
            format!("{player}... I've seen you in seventeen realities. This one feels... real."),
        ]),
        "rowan" => Some([
            format!("{name} sizes you up with a merchant's eye."),
            format!("Well met, {player}. I was hoping you'd show up, business opportunity."),
            format!("{player}, my favorite customer! I've been saving something special for you."),
        ]),
        "kira" => Some([
            format!("{name} nods curtly. Dusk falls, and dangerous creatures stir."),
            format!("{player}. Good timing. I could use someone who knows how to fight."),
            format!("{player}! Perfect timing. Got a hunt planned that needs two swords."),
        ]),
        "sage" => Some([
            format!("{name} acknowledges you with a gentle smile. The forest hums softly."),
            format!("Welcome, {player}. The plants have been whispering about you."),
            format!("{player}, dear friend. The forest spirit says you bring harmony."),
        ]),
        "thane" => Some([
            format!("{name} glances up from blueprints, hammer in hand."),
            format!("{player}. Your timing's good. I need someone with steady hands."),
            format!("{player}! Finally, someone who appreciates proper craftsmanship."),
        ]),
        "lyra" => Some([
            format!("{name} looks up from star charts, aura shimmering."),
            format!("{player}... your aura shifts like aurora tonight. Intriguing."),
            format!("{player}! The cosmos aligns. I was just thinking of you."),
        ]),
        _ => None,
    };

    let greeting = greetings
        .map(|g| g[tone].clone())
        .unwrap_or_else(|| format!("{name} looks at you."));

    let options = if level >= 50 {
        vec![
            DialogueOption::new(1, "Good to see you! What's happening?", "friendly", 1, "response"),
            DialogueOption::new(2, "I need your expertise on something.", "neutral", 0, "quest"),
            DialogueOption::new(3, "Just wanted to say hi.", "friendly", 1, "farewell"),
        ]
    } else if level >= 0 {
        vec![
            DialogueOption::new(1, "Hello. Can we talk?", "neutral", 1, "response"),
            DialogueOption::new(2, "Do you have any work?", "neutral", 0, "quest"),
            DialogueOption::new(3, "[Leave]", "neutral", 0, "farewell"),
        ]
    } else {
        vec![
            DialogueOption::new(1, "I come in peace.", "friendly", 2, "response"),
            DialogueOption::new(2, "Let's start over.", "neutral", 1, "response"),
            DialogueOption::new(3, "[Leave quietly]", "neutral", 0, "farewell"),
        ]
    };

    DialogueSet {
        npc_id: npc.id.clone(),
        npc_name: npc.name.clone(),
        player: player.to_string(),
        relationship: RelationshipSummary {
            level,
            title: relationship.title.clone(),
        },
        greeting,
        options,
        context: "greeting".to_string(),
        note: Some("Template greeting (instant, no LLM)".to_string()),
        conversation_id: None,
    }
}

/// Deterministic options for when the LLM is unavailable.
fn fallback_options(
    npc: &Npc,
    player: &str,
    relationship: &Relationship,
    context_type: &str,
) -> DialogueSet {
    let level = relationship.level;

    let (greeting, options) = if level >= 50 {
        (
            format!("Ah, {player}! Good to see you again, friend."),
            vec![
                DialogueOption::new(1, "Good to see you too! What's new?", "friendly", 1, "response"),
                DialogueOption::new(2, "I need your help with something.", "neutral", 0, "quest"),
                DialogueOption::new(3, "Just passing through.", "neutral", 0, "farewell"),
            ],
        )
    } else if level >= 0 {
        (
            format!("{} regards you with cautious interest.", npc.name),
            vec![
                DialogueOption::new(1, "Hello. I'd like to talk.", "neutral", 1, "response"),
                DialogueOption::new(2, "Do you have any work for me?", "neutral", 0, "quest"),
                DialogueOption::new(3, "[Leave]", "neutral", 0, "farewell"),
            ],
        )
    } else {
        (
            format!("{} eyes you with suspicion.", npc.name),
            vec![
                DialogueOption::new(1, "I mean no harm.", "friendly", 2, "response"),
                DialogueOption::new(2, "We don't have to be enemies.", "neutral", 1, "response"),
                DialogueOption::new(3, "[Attack]", "aggressive", -20, "combat"),
                DialogueOption::new(4, "[Leave]", "neutral", 0, "farewell"),
            ],
        )
    };

    DialogueSet {
        npc_id: npc.id.clone(),
        npc_name: npc.name.clone(),
        player: player.to_string(),
        relationship: RelationshipSummary {
            level,
            title: relationship.title.clone(),
        },
        greeting,
        options,
        context: context_type.to_string(),
        note: Some("Fallback options (LLM unavailable)".to_string()),
        conversation_id: None,
    }
}

/// Strip AI meta-references and bracketed stage directions from a response.
pub fn sanitize_npc_response(response: &str) -> String {
    let mut text = strip_delimited(response, '[', ']');
    text = strip_note_parens(&text);

    for phrase in [
        "As an AI",
        "According to my training",
        "I cannot",
        "I don't have access",
        "I am a language model",
        "I was created by",
        "My purpose is",
    ] {
        text = remove_phrase_ignore_case(&text, phrase);
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_delimited(text: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        if c == open {
            depth += 1;
        } else if c == close && depth > 0 {
            depth -= 1;
        } else if depth == 0 {
            out.push(c);
        }
    }
    out
}

fn strip_note_parens(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut index = 0;

    while index < chars.len() {
        let window: String = chars[index..].iter().take(6).collect();
        if window.eq_ignore_ascii_case("(note:") {
            match chars[index..].iter().position(|&c| c == ')') {
                Some(offset) => {
                    index += offset + 1;
                    continue;
                }
                None => break,
            }
        }
        out.push(chars[index]);
        index += 1;
    }
    out
}

fn remove_phrase_ignore_case(text: &str, phrase: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let needle = phrase.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(found) = lower[cursor..].find(&needle) {
        let start = cursor + found;
        out.push_str(&text[cursor..start]);
        cursor = start + needle.len();
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npc(id: &str) -> Npc {
        Npc {
            id: id.to_string(),
            name: "Marina".to_string(),
            personality: "warm".to_string(),
            backstory: "dockmaster".to_string(),
            model: "llama3.1:8b".to_string(),
            location: None,
            interests: Vec::new(),
            quest_types: Vec::new(),
            appearance: None,
            skin: None,
            dialogue_style: "warm".to_string(),
            is_dynamic: false,
            template_id: None,
            created_at: None,
        }
    }

    fn service(dir: &std::path::Path) -> DialogueService {
        DialogueService::new(
            dir.join("relationships.json"),
            dir.join("merchant_inventory.json"),
        )
    }

    #[test]
    fn relationship_titles() {
        assert_eq!(title_for_level(85), "Trusted Ally");
        assert_eq!(title_for_level(50), "Friend");
        assert_eq!(title_for_level(20), "Acquaintance");
        assert_eq!(title_for_level(0), "Stranger");
        assert_eq!(title_for_level(-30), "Distrusted");
        assert_eq!(title_for_level(-80), "Enemy");
    }

    #[test]
    fn relationship_level_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path());

        service.update_relationship("marina", "Steve", 150, None);
        assert_eq!(service.relationship("marina", "Steve").level, 100);

        service.update_relationship("marina", "Steve", -300, Some("Burned the docks"));
        let rel = service.relationship("marina", "Steve");
        assert_eq!(rel.level, -100);
        assert_eq!(rel.title, "Enemy");
        assert_eq!(rel.interactions, 2);
        assert_eq!(rel.memorable_actions.len(), 1);
    }

    #[test]
    fn memorable_actions_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service(dir.path());
        for i in 0..30 {
            service.update_relationship("marina", "Steve", 1, Some(&format!("deed {i}")));
        }
        let rel = service.relationship("marina", "Steve");
        assert_eq!(rel.memorable_actions.len(), MEMORABLE_ACTIONS_CAP);
        assert_eq!(rel.memorable_actions.last().unwrap().action, "deed 29");
    }

    #[test]
    fn greeting_template_matches_relationship_tone() {
        let relationship = Relationship::default();
        let set = greeting_template(&npc("marina"), "Steve", &relationship);
        assert!(set.greeting.contains("mending nets"));
        assert_eq!(set.options.len(), 3);
        assert!(set.note.is_some());

        let close = Relationship {
            level: 60,
            ..Relationship::default()
        };
        let set = greeting_template(&npc("marina"), "Steve", &close);
        assert!(set.greeting.contains("my friend"));

        let unknown = greeting_template(&npc("someone_else"), "Steve", &relationship);
        assert_eq!(unknown.greeting, "Marina looks at you.");
    }

    #[test]
    fn hostile_fallback_includes_attack_option() {
        let relationship = Relationship {
            level: -60,
            title: "Enemy".to_string(),
            ..Relationship::default()
        };
        let set = fallback_options(&npc("marina"), "Steve", &relationship, "greeting");
        assert_eq!(set.options.len(), 4);
        assert!(set.options.iter().any(|o| o.leads_to == "combat"));
    }

    #[test]
    fn sanitizer_strips_meta_references() {
        let raw = "As an AI, I think [waves hand] the harbor is lovely. (Note: stay in character) Safe travels!";
        let clean = sanitize_npc_response(raw);
        assert_eq!(clean, ", I think the harbor is lovely. Safe travels!");
        assert!(!clean.contains('['));
        assert!(!clean.to_lowercase().contains("as an ai"));
    }

    #[test]
    fn sanitizer_collapses_whitespace() {
        let clean = sanitize_npc_response("Hello   there \n  friend");
        assert_eq!(clean, "Hello there friend");
    }
}
