//! NPC parties
//!
//! One party per player, up to four NPC members. Party chat is routed to the
//! member whose expertise best matches the message; discussion rounds ask
//! every member for their perspective.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::llm::LlmRouter;
use crate::npc::{Npc, NpcService};
use crate::store;

const MAX_MEMBERS: usize = 4;
const CHAT_HISTORY_CAP: usize = 50;
const PARTY_MODEL: &str = "llama3.2:latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub player: String,
    pub message: String,
    pub responder: String,
    pub response: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub leader: String,
    /// NPC ids, in join order.
    pub members: Vec<String>,
    pub created: String,
    #[serde(default)]
    pub shared_quests: Vec<String>,
    #[serde(default)]
    pub chat_history: Vec<ChatEntry>,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct MemberSummary {
    pub id: String,
    pub name: String,
    pub personality: String,
    pub interests: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PartyStatus {
    pub has_party: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
    pub members: Vec<MemberSummary>,
    pub member_count: usize,
    pub shared_quests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub recent_chat: usize,
}

#[derive(Debug, Serialize)]
pub struct InviteResult {
    pub npc_id: String,
    pub npc_name: String,
    pub message: String,
    pub npc_response: String,
    pub party_size: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatResult {
    pub responder_id: String,
    pub responder_name: String,
    pub response: String,
    pub party_members: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
pub struct Perspective {
    pub npc_id: String,
    pub npc_name: String,
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct DiscussionResult {
    pub topic: String,
    pub responses: Vec<Perspective>,
    pub participant_count: usize,
}

pub struct PartyService {
    path: PathBuf,
    parties: HashMap<String, Party>,
}

impl PartyService {
    pub fn new(path: PathBuf) -> Self {
        let parties = store::load_or_default(&path, HashMap::new);
        Self { path, parties }
    }

    fn save(&self) {
        store::save_best_effort(&self.path, &self.parties, "parties");
    }

    pub fn party(&self, player: &str) -> Option<&Party> {
        self.parties.get(player)
    }

    pub fn create(&mut self, player: &str, name: Option<&str>) -> std::result::Result<&Party, String> {
        if self.parties.contains_key(player) {
            return Err("Player already has a party".to_string());
        }

        let party = Party {
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("{player}'s Party")),
            leader: player.to_string(),
            members: Vec::new(),
            created: Utc::now().to_rfc3339(),
            shared_quests: Vec::new(),
            chat_history: Vec::new(),
            active: true,
        };

        self.parties.insert(player.to_string(), party);
        self.save();
        Ok(&self.parties[player])
    }

    pub async fn invite(
        &mut self,
        router: &LlmRouter,
        npcs: &NpcService,
        player: &str,
        npc_id: &str,
    ) -> std::result::Result<InviteResult, String> {
        let npc = npcs
            .get(npc_id)
            .map_err(|_| format!("NPC '{npc_id}' not found"))?
            .clone();

        let party = self
            .parties
            .get_mut(player)
            .ok_or_else(|| "No active party. Create one first with /party create".to_string())?;

        if party.members.iter().any(|m| m == npc_id) {
            return Err(format!("{} is already in your party", npc.name));
        }
        if party.members.len() >= MAX_MEMBERS {
            return Err(format!("Party is full (max {MAX_MEMBERS} members)"));
        }

        party.members.push(npc_id.to_string());
        let other_members = member_names(npcs, &party.members, npc_id);
        self.save();

        let response = generate_join_response(router, &npc, player, &other_members).await;

        let party = &self.parties[player];
        Ok(InviteResult {
            npc_id: npc_id.to_string(),
            npc_name: npc.name.clone(),
            message: format!("{} has joined the party!", npc.name),
            npc_response: response,
            party_size: party.members.len(),
        })
    }

    /// Remove one member, or disband the whole party when no NPC is named.
    pub fn leave(
        &mut self,
        npcs: &NpcService,
        player: &str,
        npc_id: Option<&str>,
    ) -> std::result::Result<String, String> {
        let party = self
            .parties
            .get_mut(player)
            .ok_or_else(|| "No active party".to_string())?;

        match npc_id {
            Some(npc_id) => {
                let index = party
                    .members
                    .iter()
                    .position(|m| m == npc_id)
                    .ok_or_else(|| "NPC not in party".to_string())?;
                party.members.remove(index);
                let name = npcs
                    .get(npc_id)
                    .map(|n| n.name.clone())
                    .unwrap_or_else(|_| npc_id.to_string());
                self.save();
                Ok(format!("{name} has left the party"))
            }
            None => {
                self.parties.remove(player);
                self.save();
                Ok("Party has been disbanded".to_string())
            }
        }
    }

    /// Send a message to the party. The best-matching member answers.
    pub async fn chat(
        &mut self,
        router: &LlmRouter,
        npcs: &NpcService,
        player: &str,
        message: &str,
    ) -> std::result::Result<ChatResult, String> {
        let party = self
            .parties
            .get(player)
            .ok_or_else(|| "No active party".to_string())?;
        if party.members.is_empty() {
            return Err("No members in party".to_string());
        }

        let responder_id = route_message(npcs, message, &party.members)
            .unwrap_or_else(|| party.members[0].clone());
        let npc = npcs
            .get(&responder_id)
            .map_err(|_| format!("NPC '{responder_id}' not found"))?
            .clone();

        let other_members = member_names(npcs, &party.members, &responder_id);
        let response =
            generate_party_response(router, &npc, player, message, &other_members, party).await;

        let members: Vec<(String, String)> = party
            .members
            .iter()
            .map(|id| (id.clone(), npc_name(npcs, id)))
            .collect();

        let party = self.parties.get_mut(player).expect("party checked above");
        party.chat_history.push(ChatEntry {
            player: player.to_string(),
            message: message.to_string(),
            responder: responder_id.clone(),
            response: response.clone(),
            timestamp: Utc::now().to_rfc3339(),
        });
        if party.chat_history.len() > CHAT_HISTORY_CAP {
            let excess = party.chat_history.len() - CHAT_HISTORY_CAP;
            party.chat_history.drain(..excess);
        }
        self.save();

        Ok(ChatResult {
            responder_id,
            responder_name: npc.name,
            response,
            party_members: members,
        })
    }

    /// Ask every member for their perspective on a topic.
    pub async fn discuss(
        &self,
        router: &LlmRouter,
        npcs: &NpcService,
        player: &str,
        topic: &str,
    ) -> std::result::Result<DiscussionResult, String> {
        let party = self
            .parties
            .get(player)
            .ok_or_else(|| "No active party".to_string())?;
        if party.members.is_empty() {
            return Err("No members in party".to_string());
        }

        let mut responses = Vec::new();
        for npc_id in &party.members {
            let Ok(npc) = npcs.get(npc_id) else { continue };
            let others = member_names(npcs, &party.members, npc_id);

            let prompt = format!(
                "You are {}, a {} character.\n\
                 Your interests: {}\n\
                 Your dialogue style: {}\n\n\
                 The party leader {} wants to discuss: \"{}\"\n\n\
                 Other party members who will also give their perspective: {}\n\n\
                 Give your unique perspective on this topic based on your expertise and personality.\n\
                 Keep it brief (1-2 sentences) and distinct from what others might say.\n\
                 Just provide your dialogue response.",
                npc.name,
                npc.personality,
                npc.interests.join(", "),
                npc.dialogue_style,
                player,
                topic,
                others.join(", "),
            );

            let response = match router.generate_text(PARTY_MODEL, &prompt).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Error getting {}'s response: {}", npc.name, e);
                    format!("*{} thinks quietly*", npc.name)
                }
            };

            responses.push(Perspective {
                npc_id: npc_id.clone(),
                npc_name: npc.name.clone(),
                response,
            });
        }

        Ok(DiscussionResult {
            topic: topic.to_string(),
            participant_count: responses.len(),
            responses,
        })
    }

    pub fn status(&self, npcs: &NpcService, player: &str) -> PartyStatus {
        match self.parties.get(player) {
            None => PartyStatus {
                has_party: false,
                name: None,
                leader: None,
                members: Vec::new(),
                member_count: 0,
                shared_quests: Vec::new(),
                created: None,
                recent_chat: 0,
            },
            Some(party) => {
                let members: Vec<MemberSummary> = party
                    .members
                    .iter()
                    .map(|id| match npcs.get(id) {
                        Ok(npc) => MemberSummary {
                            id: id.clone(),
                            name: npc.name.clone(),
                            personality: npc.personality.clone(),
                            interests: npc.interests.clone(),
                        },
                        Err(_) => MemberSummary {
                            id: id.clone(),
                            name: id.clone(),
                            personality: String::new(),
                            interests: Vec::new(),
                        },
                    })
                    .collect();

                PartyStatus {
                    has_party: true,
                    name: Some(party.name.clone()),
                    leader: Some(party.leader.clone()),
                    member_count: members.len(),
                    members,
                    shared_quests: party.shared_quests.clone(),
                    created: Some(party.created.clone()),
                    recent_chat: party.chat_history.len(),
                }
            }
        }
    }
}

fn npc_name(npcs: &NpcService, npc_id: &str) -> String {
    npcs.get(npc_id)
        .map(|n| n.name.clone())
        .unwrap_or_else(|_| npc_id.to_string())
}

fn member_names(npcs: &NpcService, members: &[String], except: &str) -> Vec<String> {
    members
        .iter()
        .filter(|id| *id != except)
        .map(|id| npc_name(npcs, id))
        .collect()
}

const COMBAT_KEYWORDS: &[&str] = &[
    "fight", "combat", "monster", "kill", "attack", "defend", "weapon", "sword", "armor",
    "battle", "war", "enemy", "mob", "zombie", "skeleton", "creeper", "enderman", "hostile",
    "danger", "protect", "guard", "raid", "pillager", "damage", "health", "shield", "bow",
    "arrow", "axe", "trident", "hunt",
];

const BUILDING_KEYWORDS: &[&str] = &[
    "build", "structure", "block", "construct", "house", "castle", "tower", "wall", "roof",
    "floor", "foundation", "design", "architecture", "blueprint", "medieval", "modern",
    "rustic", "mansion", "fort", "fortress", "bridge", "temple", "monument", "statue",
    "garden", "landscape", "terraforming", "symmetry", "layout", "interior", "exterior",
    "decoration", "renovation",
];

const ART_KEYWORDS: &[&str] = &[
    "art", "beauty", "star", "color", "aesthetic", "palette", "theme", "style", "creative",
    "inspiration", "vision", "mood", "atmosphere", "vibe", "feeling", "beautiful", "pretty",
    "gorgeous", "stunning", "elegant", "cozy", "warm", "dramatic", "mystical", "enchanting",
    "magical", "lighting", "ambiance", "texture", "pattern", "gradient", "contrast",
    "harmony", "composition",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "craft", "resource", "redstone", "efficiency", "farm", "automate", "machine", "mechanism",
    "contraption", "circuit", "piston", "hopper", "dispenser", "observer", "comparator",
    "repeater", "storage", "sorting", "item", "xp", "grind", "optimize", "efficient",
    "productivity", "yield", "output", "input", "system", "design", "technical",
    "engineering", "calculation",
];

const EXPLORATION_KEYWORDS: &[&str] = &[
    "explore", "discover", "find", "search", "adventure", "journey", "travel", "biome",
    "cave", "dungeon", "stronghold", "end", "nether", "portal", "treasure", "loot", "chest",
    "secret", "hidden", "mystery", "lore", "history", "ancient", "ruins", "artifact",
    "relic", "legend", "story", "map", "compass", "coordinate", "location", "spawn",
    "village", "temple",
];

/// Score every member against the message and pick the best match.
/// Interests score 3, quest types 2, personality words 1, plus a domain
/// keyword bonus of 5 for the member whose expertise covers that domain.
fn route_message(npcs: &NpcService, message: &str, members: &[String]) -> Option<String> {
    let message_lower = message.to_lowercase();
    let mut best: Option<(String, i32)> = None;

    for npc_id in members {
        let Ok(npc) = npcs.get(npc_id) else { continue };
        let score = score_npc(npc, &message_lower);
        if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((npc_id.clone(), score));
        }
    }

    best.map(|(id, _)| id)
}

fn score_npc(npc: &Npc, message_lower: &str) -> i32 {
    let mut score = 0;

    for interest in &npc.interests {
        if message_lower.contains(&interest.to_lowercase()) {
            score += 3;
        }
    }
    for quest_type in &npc.quest_types {
        if message_lower.contains(&quest_type.to_lowercase()) {
            score += 2;
        }
    }
    for word in npc.personality.to_lowercase().split(", ") {
        if !word.is_empty() && message_lower.contains(word) {
            score += 1;
        }
    }

    let has = |list: &[&str]| list.iter().any(|w| message_lower.contains(w));
    let interest = |name: &str| npc.interests.iter().any(|i| i == name);
    let quest_type = |name: &str| npc.quest_types.iter().any(|q| q == name);

    if has(COMBAT_KEYWORDS) && (interest("combat") || quest_type("protection")) {
        score += 5;
    }
    if has(BUILDING_KEYWORDS) && (interest("ancient architecture") || quest_type("building")) {
        score += 5;
    }
    if has(ART_KEYWORDS) && (interest("aesthetics") || quest_type("artistic")) {
        score += 5;
    }
    if has(TECHNICAL_KEYWORDS) && (interest("crafting") || quest_type("optimization")) {
        score += 5;
    }
    if has(EXPLORATION_KEYWORDS)
        && (interest("exploration") || quest_type("lore") || interest("nature"))
    {
        score += 5;
    }

    score
}

async fn generate_join_response(
    router: &LlmRouter,
    npc: &Npc,
    player: &str,
    other_members: &[String],
) -> String {
    let with_others = if other_members.is_empty() {
        String::new()
    } else {
        format!(" with {}", other_members.join(", "))
    };

    let prompt = format!(
        "You are {}, a {} character.\n\
         {} has invited you to join their party{}.\n\n\
         Generate a brief (1-2 sentence) in-character response accepting the invitation.\n\
         Your dialogue style: {}\n\n\
         Just provide the dialogue response, no extra formatting.",
        npc.name, npc.personality, player, with_others, npc.dialogue_style,
    );

    match router.generate_text(PARTY_MODEL, &prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Error generating join response: {}", e);
            format!("*{} nods and joins the party*", npc.name)
        }
    }
}

async fn generate_party_response(
    router: &LlmRouter,
    npc: &Npc,
    player: &str,
    message: &str,
    other_members: &[String],
    party: &Party,
) -> String {
    let recent_chat = if party.chat_history.is_empty() {
        "First message".to_string()
    } else {
        party
            .chat_history
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|c| format!("{}: {}\n{}: {}", c.player, c.message, c.responder, c.response))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let members = if other_members.is_empty() {
        "Just you".to_string()
    } else {
        other_members.join(", ")
    };

    let prompt = format!(
        "You are {}, a {} character in a party.\n\n\
         Your dialogue style: {}\n\n\
         Party members: {}\n\n\
         Recent party chat:\n{}\n\n\
         {} says: \"{}\"\n\n\
         Generate a helpful in-character response. You may:\n\
         - Reference other party members if relevant\n\
         - Suggest they ask another member if it's more their expertise\n\
         - Stay true to your personality and knowledge\n\n\
         Keep response concise (2-3 sentences max).\n\
         Just provide the dialogue, no extra formatting.",
        npc.name, npc.personality, npc.dialogue_style, members, recent_chat, player, message,
    );

    match router.generate_text(PARTY_MODEL, &prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Error generating party response: {}", e);
            format!("*{} considers your words thoughtfully*", npc.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::events::EventLog;
    use serde_json::json;

    fn npc_service(dir: &std::path::Path) -> NpcService {
        let config = ServerConfig::with_data_dir(dir);
        let npcs = json!({
            "npcs": [
                {
                    "id": "kira",
                    "name": "Kira",
                    "personality": "Fierce, loyal monster hunter",
                    "backstory": "Hunts at dusk",
                    "model": "llama3.1:8b",
                    "interests": ["combat", "hunting"],
                    "questTypes": ["protection"],
                    "dialogue_style": "blunt"
                },
                {
                    "id": "sage",
                    "name": "Sage",
                    "personality": "Calm, wise druid",
                    "backstory": "Speaks for the forest",
                    "model": "llama3.1:8b",
                    "interests": ["exploration", "nature"],
                    "questTypes": ["lore"],
                    "dialogue_style": "gentle"
                }
            ]
        });
        std::fs::write(
            config.npc_config_path(),
            serde_json::to_string(&npcs).unwrap(),
        )
        .unwrap();
        NpcService::new(&config, EventLog::new(config.events_path()))
    }

    fn party_service(dir: &std::path::Path) -> PartyService {
        PartyService::new(dir.join("player_parties.json"))
    }

    #[test]
    fn one_party_per_player() {
        let dir = tempfile::tempdir().unwrap();
        let mut parties = party_service(dir.path());

        let party = parties.create("Steve", None).unwrap();
        assert_eq!(party.name, "Steve's Party");
        assert_eq!(party.leader, "Steve");

        assert!(parties.create("Steve", Some("Second")).is_err());
        assert!(parties.create("Alex", Some("The Wardens")).is_ok());
    }

    #[test]
    fn routing_prefers_domain_expertise() {
        let dir = tempfile::tempdir().unwrap();
        let npcs = npc_service(dir.path());
        let members = vec!["kira".to_string(), "sage".to_string()];

        let combat = route_message(&npcs, "A zombie horde is going to attack us!", &members);
        assert_eq!(combat.as_deref(), Some("kira"));

        let exploring = route_message(&npcs, "Where should we explore for ancient ruins?", &members);
        assert_eq!(exploring.as_deref(), Some("sage"));
    }

    #[test]
    fn leave_removes_member_and_disbands() {
        let dir = tempfile::tempdir().unwrap();
        let npcs = npc_service(dir.path());
        let mut parties = party_service(dir.path());

        parties.create("Steve", None).unwrap();
        parties
            .parties
            .get_mut("Steve")
            .unwrap()
            .members
            .push("kira".to_string());

        let message = parties.leave(&npcs, "Steve", Some("kira")).unwrap();
        assert_eq!(message, "Kira has left the party");
        assert!(parties.party("Steve").unwrap().members.is_empty());

        parties.leave(&npcs, "Steve", None).unwrap();
        assert!(parties.party("Steve").is_none());

        assert!(parties.leave(&npcs, "Steve", None).is_err());
    }

    #[test]
    fn status_reports_members() {
        let dir = tempfile::tempdir().unwrap();
        let npcs = npc_service(dir.path());
        let mut parties = party_service(dir.path());

        let empty = parties.status(&npcs, "Steve");
        assert!(!empty.has_party);

        parties.create("Steve", Some("Dawn Patrol")).unwrap();
        parties
            .parties
            .get_mut("Steve")
            .unwrap()
            .members
            .push("sage".to_string());

        let status = parties.status(&npcs, "Steve");
        assert!(status.has_party);
        assert_eq!(status.name.as_deref(), Some("Dawn Patrol"));
        assert_eq!(status.member_count, 1);
        assert_eq!(status.members[0].name, "Sage");
    }
}
