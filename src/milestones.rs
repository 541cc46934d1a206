//! Player milestones
//!
//! Static threshold tables over lifetime stats. Checking records newly
//! crossed thresholds with timestamps and reports per-category progress.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::events::EventLog;
use crate::store;

struct Threshold {
    value: u64,
    title: &'static str,
    message: &'static str,
}

struct Category {
    key: &'static str,
    name: &'static str,
    thresholds: &'static [Threshold],
}

macro_rules! thresholds {
    ($(($value:expr, $title:expr, $message:expr)),* $(,)?) => {
        &[$(Threshold { value: $value, title: $title, message: $message }),*]
    };
}

const CATEGORIES: &[Category] = &[
    Category {
        key: "blocks_placed",
        name: "Builder",
        thresholds: thresholds![
            (100, "Novice Builder", "You've placed your first 100 blocks!"),
            (500, "Apprentice Builder", "500 blocks placed - your builds are taking shape!"),
            (1000, "Journeyman Builder", "1,000 blocks! You're becoming a skilled builder."),
            (5000, "Expert Builder", "5,000 blocks placed - your creations are impressive!"),
            (10000, "Master Builder", "10,000 blocks! A true master of construction."),
            (50000, "Legendary Builder", "50,000 blocks - your legacy will stand for ages!"),
        ],
    },
    Category {
        key: "builds_completed",
        name: "Architect",
        thresholds: thresholds![
            (1, "First Build", "You've completed your first build!"),
            (5, "Budding Architect", "5 builds completed - you're on a roll!"),
            (10, "Established Architect", "10 builds - your portfolio grows!"),
            (25, "Renowned Architect", "25 builds! Your name is known."),
            (50, "Legendary Architect", "50 builds - a true visionary!"),
        ],
    },
    Category {
        key: "mobs_killed",
        name: "Hunter",
        thresholds: thresholds![
            (10, "Novice Hunter", "10 mobs defeated - the hunt begins!"),
            (50, "Skilled Hunter", "50 mobs down - you're getting dangerous!"),
            (100, "Expert Hunter", "100 mobs! The creatures fear you."),
            (500, "Master Hunter", "500 mobs defeated - a true champion!"),
            (1000, "Legendary Hunter", "1,000 mobs! You are death incarnate."),
        ],
    },
    Category {
        key: "biomes_visited",
        name: "Explorer",
        thresholds: thresholds![
            (3, "Curious Wanderer", "You've explored 3 different biomes!"),
            (5, "Adventurer", "5 biomes discovered - the world opens up!"),
            (10, "Seasoned Explorer", "10 biomes! You know these lands well."),
            (15, "World Traveler", "15 biomes explored - few places remain unknown!"),
            (20, "Legendary Explorer", "20 biomes! You've seen it all."),
        ],
    },
    Category {
        key: "time_played",
        name: "Veteran",
        thresholds: thresholds![
            (3600, "First Hour", "You've spent an hour in this world!"),
            (18000, "Dedicated Player", "5 hours played - you're hooked!"),
            (36000, "Committed Builder", "10 hours! This world is your home."),
            (180000, "Veteran", "50 hours played - a true veteran!"),
            (360000, "Legend", "100 hours! Your dedication is legendary."),
        ],
    },
    Category {
        key: "unique_blocks_used",
        name: "Collector",
        thresholds: thresholds![
            (10, "Block Curious", "You've used 10 different block types!"),
            (25, "Material Explorer", "25 block types - variety is key!"),
            (50, "Block Connoisseur", "50 types! You know your materials."),
            (100, "Master Collector", "100 block types used - impressive variety!"),
        ],
    },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievedMilestone {
    pub achieved_at: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerMilestones {
    #[serde(default)]
    pub achieved: HashMap<String, AchievedMilestone>,
    #[serde(default)]
    pub last_checked: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMilestone {
    pub category: String,
    pub title: String,
    pub message: String,
    pub threshold: u64,
    pub current_value: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextMilestone {
    pub threshold: u64,
    pub title: String,
    pub remaining: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryProgress {
    pub current_value: u64,
    pub current_level: Option<String>,
    pub next_milestone: Option<NextMilestone>,
    pub category_name: String,
}

#[derive(Debug, Serialize)]
pub struct MilestoneCheck {
    pub player: String,
    pub new_milestones: Vec<NewMilestone>,
    pub progress: HashMap<String, CategoryProgress>,
    pub total_achievements: usize,
}

#[derive(Debug, Serialize)]
pub struct Achievement {
    pub category: String,
    pub title: String,
    pub message: String,
    pub achieved_at: String,
    pub value_at_achievement: u64,
}

#[derive(Debug, Serialize)]
pub struct AchievementList {
    pub player: String,
    pub achievements: Vec<Achievement>,
    pub count: usize,
}

pub struct MilestoneService {
    path: PathBuf,
    events: EventLog,
    players: HashMap<String, PlayerMilestones>,
}

impl MilestoneService {
    pub fn new(path: PathBuf, events: EventLog) -> Self {
        let players = store::load_or_default(&path, HashMap::new);
        Self {
            path,
            events,
            players,
        }
    }

    /// Recompute stats, record any newly crossed thresholds and return them
    /// along with progress toward the next one in each category.
    pub fn check(&mut self, player: &str) -> MilestoneCheck {
        let stats = self.events.player_stats(player);
        let record = self.players.entry(player.to_string()).or_default();

        let mut new_milestones = Vec::new();
        let mut progress = HashMap::new();

        for category in CATEGORIES {
            let current_value = stats.get(category.key);
            let mut current_level = None;
            let mut next_milestone = None;

            for threshold in category.thresholds {
                if current_value >= threshold.value {
                    current_level = Some(threshold.title.to_string());

                    let id = format!("{}_{}", category.key, threshold.value);
                    if !record.achieved.contains_key(&id) {
                        record.achieved.insert(
                            id,
                            AchievedMilestone {
                                achieved_at: Utc::now().to_rfc3339(),
                                value: current_value,
                            },
                        );
                        new_milestones.push(NewMilestone {
                            category: category.key.to_string(),
                            title: threshold.title.to_string(),
                            message: threshold.message.to_string(),
                            threshold: threshold.value,
                            current_value,
                        });
                    }
                } else {
                    next_milestone = Some(NextMilestone {
                        threshold: threshold.value,
                        title: threshold.title.to_string(),
                        remaining: threshold.value - current_value,
                    });
                    break;
                }
            }

            progress.insert(
                category.key.to_string(),
                CategoryProgress {
                    current_value,
                    current_level,
                    next_milestone,
                    category_name: category.name.to_string(),
                },
            );
        }

        record.last_checked = Some(Utc::now().to_rfc3339());
        let total_achievements = record.achieved.len();
        store::save_best_effort(&self.path, &self.players, "milestones");

        MilestoneCheck {
            player: player.to_string(),
            new_milestones,
            progress,
            total_achievements,
        }
    }

    /// All achieved milestones for a player, newest first.
    pub fn list(&self, player: &str) -> AchievementList {
        let Some(record) = self.players.get(player) else {
            return AchievementList {
                player: player.to_string(),
                achievements: Vec::new(),
                count: 0,
            };
        };

        let mut achievements = Vec::new();
        for (id, data) in &record.achieved {
            let Some((key, value)) = id.rsplit_once('_') else {
                continue;
            };
            let Ok(value) = value.parse::<u64>() else {
                continue;
            };
            let Some(category) = CATEGORIES.iter().find(|c| c.key == key) else {
                continue;
            };
            if let Some(threshold) = category.thresholds.iter().find(|t| t.value == value) {
                achievements.push(Achievement {
                    category: key.to_string(),
                    title: threshold.title.to_string(),
                    message: threshold.message.to_string(),
                    achieved_at: data.achieved_at.clone(),
                    value_at_achievement: data.value,
                });
            }
        }

        achievements.sort_by(|a, b| b.achieved_at.cmp(&a.achieved_at));
        let count = achievements.len();
        AchievementList {
            player: player.to_string(),
            achievements,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_with_events(dir: &std::path::Path, events: serde_json::Value) -> MilestoneService {
        let events_path = dir.join("minecraft_events.json");
        std::fs::write(&events_path, serde_json::to_string(&events).unwrap()).unwrap();
        MilestoneService::new(dir.join("player_milestones.json"), EventLog::new(events_path))
    }

    fn kills(n: usize) -> serde_json::Value {
        let events: Vec<_> = (0..n)
            .map(|_| {
                json!({"eventType": "mob_killed", "timestamp": Utc::now().to_rfc3339(),
                       "data": {"playerName": "Steve", "mobType": "zombie"}})
            })
            .collect();
        json!(events)
    }

    #[test]
    fn crossing_a_threshold_records_it_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_with_events(dir.path(), kills(12));

        let first = service.check("Steve");
        assert!(first
            .new_milestones
            .iter()
            .any(|m| m.title == "Novice Hunter"));

        let second = service.check("Steve");
        assert!(second.new_milestones.is_empty());
        assert_eq!(second.total_achievements, first.total_achievements);
    }

    #[test]
    fn progress_reports_next_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = service_with_events(dir.path(), kills(12));

        let check = service.check("Steve");
        let hunter = &check.progress["mobs_killed"];
        assert_eq!(hunter.current_value, 12);
        assert_eq!(hunter.current_level.as_deref(), Some("Novice Hunter"));
        let next = hunter.next_milestone.as_ref().unwrap();
        assert_eq!(next.threshold, 50);
        assert_eq!(next.remaining, 38);
    }

    #[test]
    fn list_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut service = service_with_events(dir.path(), kills(12));
            service.check("Steve");
        }

        let service = MilestoneService::new(
            dir.path().join("player_milestones.json"),
            EventLog::new(dir.path().join("minecraft_events.json")),
        );
        let list = service.list("Steve");
        assert_eq!(list.count, 1);
        assert_eq!(list.achievements[0].title, "Novice Hunter");
    }

    #[test]
    fn unknown_player_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_events(dir.path(), json!([]));
        let list = service.list("Nobody");
        assert_eq!(list.count, 0);
    }
}
