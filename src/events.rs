//! Game event log
//!
//! The Fabric mod appends gameplay events to one JSON array file; everything
//! here reads that file and derives views from it: a recent-activity context
//! for NPC prompts and lifetime stats for milestone checks.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::store;

/// Window of events that feed NPC dialogue context.
const CONTEXT_WINDOW: Duration = Duration::minutes(15);
const CONTEXT_MAX_EVENTS: usize = 20;

/// One event as the mod writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    /// RFC 3339 string; kept raw so one malformed event can't poison the log.
    pub timestamp: String,
    #[serde(default)]
    pub data: JsonValue,
}

impl GameEvent {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn player_name(&self) -> Option<&str> {
        self.data.get("playerName").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildActivity {
    pub blocks: Vec<String>,
    pub count: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CombatActivity {
    pub mob: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecentActivity {
    pub building: Vec<BuildActivity>,
    pub combat: Vec<CombatActivity>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextStats {
    pub builds_completed: u64,
    pub blocks_placed: u64,
    pub mobs_killed: u64,
    pub chats: Vec<String>,
    pub biomes_visited: Vec<String>,
}

/// What an NPC "knows" about a player's recent play, fed into prompts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerContext {
    pub player: String,
    pub recent_activity: RecentActivity,
    pub location: Option<JsonValue>,
    pub inventory: Option<JsonValue>,
    pub nearby_entities: Vec<JsonValue>,
    pub stats: ContextStats,
}

impl PlayerContext {
    pub fn biome(&self) -> Option<&str> {
        self.location
            .as_ref()
            .and_then(|l| l.get("biome"))
            .and_then(|v| v.as_str())
    }
}

/// Lifetime totals used by milestone thresholds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerStats {
    pub blocks_placed: u64,
    pub builds_completed: u64,
    pub mobs_killed: u64,
    pub biomes_visited: u64,
    pub time_played: u64,
    pub unique_blocks_used: u64,
}

impl PlayerStats {
    pub fn get(&self, category: &str) -> u64 {
        match category {
            "blocks_placed" => self.blocks_placed,
            "builds_completed" => self.builds_completed,
            "mobs_killed" => self.mobs_killed,
            "biomes_visited" => self.biomes_visited,
            "time_played" => self.time_played,
            "unique_blocks_used" => self.unique_blocks_used,
            _ => 0,
        }
    }
}

/// Read-side view of the event file.
#[derive(Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Vec<GameEvent> {
        store::load_or_default(&self.path, Vec::new)
    }

    /// Build the recent-activity context for one player: last 15 minutes,
    /// capped at 20 events, with the chatty `player_state` stream collapsed
    /// to its most recent sample.
    pub fn player_context(&self, player: &str, nearby_entities: Vec<JsonValue>) -> PlayerContext {
        let events = self.load();
        let cutoff = Utc::now() - CONTEXT_WINDOW;

        let mut recent: Vec<&GameEvent> = events
            .iter()
            .filter(|e| e.player_name() == Some(player))
            .filter(|e| e.time().map(|t| t > cutoff).unwrap_or(false))
            .collect();
        if recent.len() > CONTEXT_MAX_EVENTS {
            recent = recent.split_off(recent.len() - CONTEXT_MAX_EVENTS);
        }

        // player_state fires every few seconds; only the latest matters.
        let mut filtered: Vec<&GameEvent> = Vec::with_capacity(recent.len());
        let mut last_state: Option<&GameEvent> = None;
        for event in recent {
            if event.event_type == "player_state" {
                last_state = Some(event);
            } else {
                filtered.push(event);
            }
        }
        if let Some(state) = last_state {
            filtered.push(state);
        }

        let mut context = PlayerContext {
            player: player.to_string(),
            nearby_entities,
            ..PlayerContext::default()
        };
        let mut biomes = BTreeSet::new();

        for event in filtered {
            let data = &event.data;
            match event.event_type.as_str() {
                "player_state" => {
                    context.location = Some(serde_json::json!({
                        "x": data.get("x"),
                        "y": data.get("y"),
                        "z": data.get("z"),
                        "biome": data.get("biome"),
                        "dimension": data.get("dimension"),
                        "weather": data.get("weather"),
                        "timeOfDay": data.get("timeOfDay"),
                        "health": data.get("health"),
                        "hunger": data.get("hunger"),
                    }));
                    if let Some(biome) = data.get("biome").and_then(|v| v.as_str()) {
                        biomes.insert(biome.to_string());
                    }
                }
                "build_complete" => {
                    let counts = block_counts(data);
                    let total: u64 = counts.values().sum();
                    context.stats.builds_completed += 1;
                    context.stats.blocks_placed += total;
                    context.recent_activity.building.push(BuildActivity {
                        blocks: counts.keys().cloned().collect(),
                        count: total,
                        timestamp: event.timestamp.clone(),
                    });
                }
                "mob_killed" => {
                    context.stats.mobs_killed += 1;
                    context.recent_activity.combat.push(CombatActivity {
                        mob: data
                            .get("mobType")
                            .and_then(|v| v.as_str())
                            .map(str::to_string),
                        timestamp: event.timestamp.clone(),
                    });
                }
                "player_chat" => {
                    if let Some(message) = data.get("message").and_then(|v| v.as_str()) {
                        context.stats.chats.push(message.to_string());
                    }
                }
                "inventory_snapshot" => {
                    context.inventory = data.get("inventory").cloned();
                }
                _ => {}
            }
        }

        context.stats.biomes_visited = biomes.into_iter().collect();
        context
    }

    /// Lifetime stats over the full event history. Sessions are paired
    /// start-to-end by playerId; an unmatched start contributes nothing.
    pub fn player_stats(&self, player: &str) -> PlayerStats {
        let events = self.load();
        let mut stats = PlayerStats::default();
        let mut biomes = BTreeSet::new();
        let mut block_types = BTreeSet::new();
        let mut session_starts: HashMap<String, DateTime<Utc>> = HashMap::new();

        for event in events.iter().filter(|e| e.player_name() == Some(player)) {
            let data = &event.data;
            match event.event_type.as_str() {
                "build_complete" => {
                    stats.builds_completed += 1;
                    let counts = block_counts(data);
                    stats.blocks_placed += counts.values().sum::<u64>();
                    block_types.extend(counts.into_keys());
                }
                "mob_killed" => stats.mobs_killed += 1,
                "player_state" => {
                    if let Some(biome) = data.get("biome").and_then(|v| v.as_str()) {
                        biomes.insert(biome.to_string());
                    }
                }
                "session_start" => {
                    if let (Some(id), Some(time)) = (player_id(data), event.time()) {
                        session_starts.insert(id, time);
                    }
                }
                "session_end" => {
                    if let (Some(id), Some(end)) = (player_id(data), event.time()) {
                        if let Some(start) = session_starts.remove(&id) {
                            stats.time_played += (end - start).num_seconds().max(0) as u64;
                        }
                    }
                }
                _ => {}
            }
        }

        stats.biomes_visited = biomes.len() as u64;
        stats.unique_blocks_used = block_types.len() as u64;
        stats
    }
}

pub(crate) fn block_counts(data: &JsonValue) -> HashMap<String, u64> {
    data.get("blockCounts")
        .and_then(|v| v.as_object())
        .map(|counts| {
            counts
                .iter()
                .map(|(k, v)| (k.clone(), v.as_u64().unwrap_or(0)))
                .collect()
        })
        .unwrap_or_default()
}

fn player_id(data: &JsonValue) -> Option<String> {
    data.get("playerId")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_events(dir: &std::path::Path, events: JsonValue) -> EventLog {
        let path = dir.join("minecraft_events.json");
        std::fs::write(&path, serde_json::to_string(&events).unwrap()).unwrap();
        EventLog::new(path)
    }

    fn stamp(minutes_ago: i64) -> String {
        (Utc::now() - Duration::minutes(minutes_ago)).to_rfc3339()
    }

    #[test]
    fn context_aggregates_recent_events() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_events(
            dir.path(),
            json!([
                {"eventType": "build_complete", "timestamp": stamp(5),
                 "data": {"playerName": "Steve", "blockCounts": {"minecraft:stone": 30, "minecraft:oak_planks": 20}}},
                {"eventType": "mob_killed", "timestamp": stamp(4),
                 "data": {"playerName": "Steve", "mobType": "zombie"}},
                {"eventType": "player_chat", "timestamp": stamp(3),
                 "data": {"playerName": "Steve", "message": "hello marina"}},
                {"eventType": "mob_killed", "timestamp": stamp(2),
                 "data": {"playerName": "Alex", "mobType": "skeleton"}}
            ]),
        );

        let context = log.player_context("Steve", Vec::new());
        assert_eq!(context.stats.builds_completed, 1);
        assert_eq!(context.stats.blocks_placed, 50);
        assert_eq!(context.stats.mobs_killed, 1);
        assert_eq!(context.stats.chats, vec!["hello marina"]);
        assert_eq!(context.recent_activity.combat[0].mob.as_deref(), Some("zombie"));
    }

    #[test]
    fn context_collapses_player_state_to_latest() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_events(
            dir.path(),
            json!([
                {"eventType": "player_state", "timestamp": stamp(10),
                 "data": {"playerName": "Steve", "biome": "plains", "health": 20}},
                {"eventType": "player_state", "timestamp": stamp(1),
                 "data": {"playerName": "Steve", "biome": "desert", "health": 14}}
            ]),
        );

        let context = log.player_context("Steve", Vec::new());
        assert_eq!(context.biome(), Some("desert"));
        // Only the surviving sample contributes a biome.
        assert_eq!(context.stats.biomes_visited, vec!["desert"]);
    }

    #[test]
    fn context_ignores_stale_events() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_events(
            dir.path(),
            json!([
                {"eventType": "mob_killed", "timestamp": stamp(60),
                 "data": {"playerName": "Steve", "mobType": "creeper"}}
            ]),
        );

        let context = log.player_context("Steve", Vec::new());
        assert_eq!(context.stats.mobs_killed, 0);
    }

    #[test]
    fn lifetime_stats_pair_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_events(
            dir.path(),
            json!([
                {"eventType": "session_start", "timestamp": stamp(90),
                 "data": {"playerName": "Steve", "playerId": "uuid-1"}},
                {"eventType": "session_end", "timestamp": stamp(30),
                 "data": {"playerName": "Steve", "playerId": "uuid-1"}},
                {"eventType": "build_complete", "timestamp": stamp(45),
                 "data": {"playerName": "Steve", "blockCounts": {"minecraft:stone": 10, "minecraft:glass": 5}}},
                {"eventType": "session_start", "timestamp": stamp(10),
                 "data": {"playerName": "Steve", "playerId": "uuid-1"}}
            ]),
        );

        let stats = log.player_stats("Steve");
        assert_eq!(stats.time_played, 3600);
        assert_eq!(stats.blocks_placed, 15);
        assert_eq!(stats.unique_blocks_used, 2);
    }

    #[test]
    fn missing_file_yields_empty_stats() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("absent.json"));
        let stats = log.player_stats("Steve");
        assert_eq!(stats.blocks_placed, 0);
        assert!(log.load().is_empty());
    }
}
