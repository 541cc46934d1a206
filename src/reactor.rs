//! Event reactor
//!
//! Polls the event log on an interval and sends short ambient NPC lines back
//! into the game when player behavior patterns emerge: combat streaks, big
//! builds, new biomes, storms, low health, nightfall and session starts.
//! Every reaction type carries a per-player cooldown so the chat never turns
//! into spam.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;

use crate::events::{self, EventLog, GameEvent};
use crate::game::GameCommander;
use crate::npc::{Npc, NpcService};

const COMBAT_STREAK_RESET: Duration = Duration::minutes(2);
const BUILD_REACTION_MIN_BLOCKS: u64 = 50;
const LOW_HEALTH_THRESHOLD: f64 = 6.0;

#[derive(Default)]
struct PlayerPatterns {
    combat_streak: u32,
    build_blocks: u64,
    biomes_visited: HashSet<String>,
    last_combat: Option<DateTime<Utc>>,
}

pub struct EventReactor {
    events: EventLog,
    game: GameCommander,
    last_event_count: usize,
    patterns: HashMap<String, PlayerPatterns>,
    cooldowns: HashMap<String, DateTime<Utc>>,
}

impl EventReactor {
    pub fn new(events: EventLog, game: GameCommander) -> Self {
        Self {
            events,
            game,
            last_event_count: 0,
            patterns: HashMap::new(),
            cooldowns: HashMap::new(),
        }
    }

    /// One sweep: read the log, react to events appended since last time.
    pub async fn tick(&mut self, npcs: &NpcService) {
        let all = self.events.load();
        if all.len() <= self.last_event_count {
            return;
        }

        let new_events: Vec<GameEvent> = all[self.last_event_count..].to_vec();
        self.last_event_count = all.len();

        let mut by_player: HashMap<String, Vec<GameEvent>> = HashMap::new();
        for event in new_events {
            if let Some(player) = event.player_name() {
                by_player.entry(player.to_string()).or_default().push(event);
            }
        }

        for (player, events) in by_player {
            self.process_player_events(npcs, &player, &events).await;
        }
    }

    async fn process_player_events(&mut self, npcs: &NpcService, player: &str, events: &[GameEvent]) {
        for event in events {
            match event.event_type.as_str() {
                "mob_killed" => self.handle_mob_kill(npcs, player, &event.data).await,
                "build_complete" => self.handle_build_complete(npcs, player, &event.data).await,
                "player_state" => self.handle_player_state(npcs, player, &event.data).await,
                "session_start" => self.handle_session_start(npcs, player).await,
                _ => {}
            }
        }
    }

    async fn handle_mob_kill(&mut self, npcs: &NpcService, player: &str, data: &JsonValue) {
        let now = Utc::now();
        let patterns = self.patterns.entry(player.to_string()).or_default();

        let stale = patterns
            .last_combat
            .map(|last| now - last > COMBAT_STREAK_RESET)
            .unwrap_or(false);
        if stale {
            patterns.combat_streak = 0;
        }
        patterns.combat_streak += 1;
        patterns.last_combat = Some(now);
        let streak = patterns.combat_streak;

        let mob_type = data
            .get("mobType")
            .and_then(|v| v.as_str())
            .unwrap_or("creature")
            .to_string();

        let message = match streak {
            5 => format!("I see you've been busy with those {mob_type}s. Keep your guard up."),
            10 => format!("Ten {mob_type}s down! Your combat skills are improving."),
            25 => format!("Twenty-five kills! You fight like a seasoned warrior, {player}."),
            _ => return,
        };

        let kind = format!("combat_streak_{streak}");
        if !self.cooldown_ready(player, &kind, 60) {
            return;
        }
        let Some(npc) = find_npc_by_interest(npcs, "combat") else {
            return;
        };
        let npc_name = npc.name.clone();
        self.arm_cooldown(player, &kind);
        self.send_ambient(player, &npc_name, &message).await;
    }

    async fn handle_build_complete(&mut self, npcs: &NpcService, player: &str, data: &JsonValue) {
        let counts = events::block_counts(data);
        let total: u64 = counts.values().sum();

        let patterns = self.patterns.entry(player.to_string()).or_default();
        patterns.build_blocks += total;

        if total < BUILD_REACTION_MIN_BLOCKS || !self.cooldown_ready(player, "build", 120) {
            return;
        }

        let npc = find_npc_by_interest(npcs, "architecture")
            .or_else(|| find_npc_by_interest(npcs, "building"));
        let Some(npc) = npc else { return };
        let npc_name = npc.name.clone();

        let primary_block = counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(block, _)| block.clone())
            .unwrap_or_else(|| "blocks".to_string());

        let message = format!(
            "I noticed your construction using {primary_block}. {total} blocks placed - quite the project!"
        );
        self.arm_cooldown(player, "build");
        self.send_ambient(player, &npc_name, &message).await;
    }

    async fn handle_player_state(&mut self, npcs: &NpcService, player: &str, data: &JsonValue) {
        let biome = data
            .get("biome")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let weather = data.get("weather").and_then(|v| v.as_str()).unwrap_or("clear");
        let time_of_day = data
            .get("timeOfDay")
            .and_then(|v| v.as_str())
            .unwrap_or("day");
        let health = data.get("health").and_then(|v| v.as_f64()).unwrap_or(20.0);

        let patterns = self.patterns.entry(player.to_string()).or_default();
        let new_biome = patterns.biomes_visited.insert(biome.clone());
        if new_biome {
            self.react_to_biome(npcs, player, &biome).await;
        }

        if weather == "thundering" && self.cooldown_ready(player, "weather", 300) {
            let npc = find_npc_by_interest(npcs, "nature").or_else(|| first_npc(npcs));
            if let Some(npc) = npc {
                let npc_name = npc.name.clone();
                self.arm_cooldown(player, "weather");
                self.send_ambient(
                    player,
                    &npc_name,
                    "A storm approaches. Seek shelter, or use the lightning to your advantage.",
                )
                .await;
            }
        }

        if health < LOW_HEALTH_THRESHOLD && self.cooldown_ready(player, "health_warning", 60) {
            if let Some(npc) = first_npc(npcs) {
                let npc_name = npc.name.clone();
                let message =
                    format!("Your health is dangerously low ({health:.0}/20). Find food or shelter!");
                self.arm_cooldown(player, "health_warning");
                self.send_ambient(player, &npc_name, &message).await;
            }
        }

        if time_of_day == "night" && self.cooldown_ready(player, "time_ambient", 600) {
            let npc = find_npc_by_interest(npcs, "mysterious").or_else(|| first_npc(npcs));
            if let Some(npc) = npc {
                let npc_name = npc.name.clone();
                self.arm_cooldown(player, "time_ambient");
                self.send_ambient(
                    player,
                    &npc_name,
                    "The night brings dangers... and opportunities. Stay vigilant.",
                )
                .await;
            }
        }
    }

    async fn react_to_biome(&mut self, npcs: &NpcService, player: &str, biome: &str) {
        let kind = format!("biome_{biome}");
        if !self.cooldown_ready(player, &kind, 300) {
            return;
        }
        let npc = find_npc_by_interest(npcs, "exploration")
            .or_else(|| find_npc_by_interest(npcs, "nature"));
        let Some(npc) = npc else { return };
        let npc_name = npc.name.clone();

        let comment = biome_comment(biome)
            .map(str::to_string)
            .unwrap_or_else(|| format!("You've discovered the {biome}. Explore carefully."));
        self.arm_cooldown(player, &kind);
        self.send_ambient(player, &npc_name, &comment).await;
    }

    async fn handle_session_start(&mut self, npcs: &NpcService, player: &str) {
        // Fresh session, fresh patterns.
        self.patterns.insert(player.to_string(), PlayerPatterns::default());

        if !self.cooldown_ready(player, "session_welcome", 1800) {
            return;
        }
        if let Some(npc) = first_npc(npcs) {
            let npc_name = npc.name.clone();
            let message = format!("Welcome back, {player}. The world awaits your adventures.");
            self.arm_cooldown(player, "session_welcome");
            self.send_ambient(player, &npc_name, &message).await;
        }
    }

    /// True when the per-player cooldown for `kind` has expired.
    fn cooldown_ready(&self, player: &str, kind: &str, seconds: i64) -> bool {
        let key = format!("{player}:{kind}");
        match self.cooldowns.get(&key) {
            Some(last) => Utc::now() - *last >= Duration::seconds(seconds),
            None => true,
        }
    }

    /// Arm the cooldown. Called only once a line actually goes out, so a
    /// suppressed reaction never eats the next eligible one.
    fn arm_cooldown(&mut self, player: &str, kind: &str) {
        self.cooldowns
            .insert(format!("{player}:{kind}"), Utc::now());
    }

    async fn send_ambient(&self, player: &str, npc_name: &str, message: &str) {
        let full = format!("[{npc_name}] {message}");
        tracing::debug!("Ambient to {}: {}", player, full);
        self.game.send_chat(player, &full).await;
    }
}

fn find_npc_by_interest<'a>(npcs: &'a NpcService, interest: &str) -> Option<&'a Npc> {
    let mut candidates = npcs.list();
    candidates.retain(|npc| {
        npc.interests
            .iter()
            .any(|i| i.eq_ignore_ascii_case(interest))
    });
    candidates.first().copied()
}

fn first_npc(npcs: &NpcService) -> Option<&Npc> {
    npcs.list().first().copied()
}

fn biome_comment(biome: &str) -> Option<&'static str> {
    let comments = [
        ("forest", "The forest holds many secrets. Watch for rare mushrooms."),
        ("desert", "The desert is unforgiving. Stay hydrated and watch for temples."),
        ("ocean", "The ocean depths contain treasures and dangers alike."),
        ("mountains", "High altitudes offer rare ores. Mind your step."),
        ("swamp", "Swamps are treacherous but rich in slimes and witches."),
        ("jungle", "The jungle is dense with life. Parrots and ocelots roam here."),
        ("taiga", "Cold lands breed hardy creatures. Wolves make loyal companions."),
        ("plains", "Open plains are good for farming and horse taming."),
    ];

    let lower = biome.to_lowercase();
    comments
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, comment)| *comment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use serde_json::json;

    fn npc_service(dir: &std::path::Path) -> NpcService {
        let config = ServerConfig::with_data_dir(dir);
        let npcs = json!({
            "npcs": [
                {
                    "id": "kira",
                    "name": "Kira",
                    "personality": "Fierce monster hunter",
                    "backstory": "Hunts at dusk",
                    "model": "llama3.1:8b",
                    "interests": ["combat"],
                    "dialogue_style": "blunt"
                },
                {
                    "id": "sage",
                    "name": "Sage",
                    "personality": "Calm druid",
                    "backstory": "Forest keeper",
                    "model": "llama3.1:8b",
                    "interests": ["exploration", "nature"],
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

    fn reactor(dir: &std::path::Path) -> EventReactor {
        let config = ServerConfig::with_data_dir(dir);
        EventReactor::new(
            EventLog::new(config.events_path()),
            // Unroutable port: sends fail fast and are best-effort anyway.
            GameCommander::new("http://localhost:1"),
        )
    }

    fn write_events(dir: &std::path::Path, events: &JsonValue) {
        let config = ServerConfig::with_data_dir(dir);
        std::fs::write(
            config.events_path(),
            serde_json::to_string(events).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn only_new_events_are_processed() {
        let dir = tempfile::tempdir().unwrap();
        let npcs = npc_service(dir.path());
        let mut reactor = reactor(dir.path());

        let now = Utc::now().to_rfc3339();
        write_events(
            dir.path(),
            &json!([
                {"eventType": "mob_killed", "timestamp": now, "data": {"playerName": "Steve", "mobType": "zombie"}}
            ]),
        );

        reactor.tick(&npcs).await;
        assert_eq!(reactor.last_event_count, 1);
        assert_eq!(reactor.patterns["Steve"].combat_streak, 1);

        // Same file again: nothing new, no double counting.
        reactor.tick(&npcs).await;
        assert_eq!(reactor.patterns["Steve"].combat_streak, 1);
    }

    #[tokio::test]
    async fn combat_streak_accumulates_per_player() {
        let dir = tempfile::tempdir().unwrap();
        let npcs = npc_service(dir.path());
        let mut reactor = reactor(dir.path());

        let now = Utc::now().to_rfc3339();
        let kill = |player: &str| {
            json!({"eventType": "mob_killed", "timestamp": now, "data": {"playerName": player, "mobType": "skeleton"}})
        };
        write_events(
            dir.path(),
            &json!([kill("Steve"), kill("Steve"), kill("Alex")]),
        );

        reactor.tick(&npcs).await;
        assert_eq!(reactor.patterns["Steve"].combat_streak, 2);
        assert_eq!(reactor.patterns["Alex"].combat_streak, 1);
    }

    #[tokio::test]
    async fn session_start_resets_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let npcs = npc_service(dir.path());
        let mut reactor = reactor(dir.path());

        let now = Utc::now().to_rfc3339();
        write_events(
            dir.path(),
            &json!([
                {"eventType": "mob_killed", "timestamp": now, "data": {"playerName": "Steve", "mobType": "zombie"}},
                {"eventType": "session_start", "timestamp": now, "data": {"playerName": "Steve"}}
            ]),
        );

        reactor.tick(&npcs).await;
        assert_eq!(reactor.patterns["Steve"].combat_streak, 0);
    }

    #[tokio::test]
    async fn biome_discovery_is_tracked_once() {
        let dir = tempfile::tempdir().unwrap();
        let npcs = npc_service(dir.path());
        let mut reactor = reactor(dir.path());

        let now = Utc::now().to_rfc3339();
        let state = json!({"eventType": "player_state", "timestamp": now, "data": {"playerName": "Steve", "biome": "dark_forest", "weather": "clear", "timeOfDay": "day", "health": 20.0}});
        write_events(dir.path(), &json!([state, state]));

        reactor.tick(&npcs).await;
        assert_eq!(reactor.patterns["Steve"].biomes_visited.len(), 1);
    }

    #[test]
    fn cooldowns_gate_repeat_reactions() {
        let dir = tempfile::tempdir().unwrap();
        let mut reactor = reactor(dir.path());

        assert!(reactor.cooldown_ready("Steve", "build", 120));
        reactor.arm_cooldown("Steve", "build");
        assert!(!reactor.cooldown_ready("Steve", "build", 120));
        // Different player or kind has its own clock.
        assert!(reactor.cooldown_ready("Alex", "build", 120));
        assert!(reactor.cooldown_ready("Steve", "weather", 300));
        // Checking alone never arms.
        assert!(reactor.cooldown_ready("Alex", "build", 120));
    }

    #[tokio::test]
    async fn missing_speaker_leaves_cooldown_unarmed() {
        let dir = tempfile::tempdir().unwrap();
        let mut reactor = reactor(dir.path());

        let now = Utc::now().to_rfc3339();
        let session = json!({"eventType": "session_start", "timestamp": now, "data": {"playerName": "Steve"}});
        write_events(dir.path(), &json!([session.clone()]));

        // No NPC registry at all: nobody can deliver the welcome, and the
        // welcome cooldown must stay cold.
        let empty_dir = tempfile::tempdir().unwrap();
        let silent = NpcService::new(
            &ServerConfig::with_data_dir(empty_dir.path()),
            EventLog::new(empty_dir.path().join("minecraft_events.json")),
        );
        reactor.tick(&silent).await;
        assert!(!reactor.cooldowns.contains_key("Steve:session_welcome"));

        // The next session event finds a speaker and the welcome fires.
        write_events(dir.path(), &json!([session.clone(), session]));
        let npcs = npc_service(dir.path());
        reactor.tick(&npcs).await;
        assert!(reactor.cooldowns.contains_key("Steve:session_welcome"));
    }

    #[test]
    fn biome_comments_match_substrings() {
        assert!(biome_comment("old_growth_birch_forest").unwrap().contains("forest"));
        assert!(biome_comment("deep_ocean").is_some());
        assert!(biome_comment("mushroom_fields").is_none());
    }
}
