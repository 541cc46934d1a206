//! Build challenges
//!
//! Config-defined build templates an NPC can hand out as quests, plus the
//! validation of a finished build against the challenge requirements.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::quests::Reward;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRequirement {
    #[serde(default)]
    pub min: u64,
    /// Accept any block from this list toward the minimum.
    #[serde(rename = "anyOf", default)]
    pub any_of: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default)]
    pub min_blocks: u64,
    #[serde(default)]
    pub min_height: u64,
    #[serde(default)]
    pub required_block_types: BTreeMap<String, BlockRequirement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    #[serde(default)]
    pub min_unique_blocks: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeTemplate {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub giver_affinity: Vec<String>,
    pub requirements: Requirements,
    pub reward: Reward,
    #[serde(default)]
    pub validation: ValidationRules,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

impl ChallengeTemplate {
    pub fn suits(&self, npc_id: &str) -> bool {
        self.giver_affinity.iter().any(|id| id == npc_id)
    }
}

/// Block counts and measured height of a finished build.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildData {
    #[serde(default)]
    pub blocks: HashMap<String, u64>,
    #[serde(default)]
    pub height: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub pass: bool,
    pub required: u64,
    pub actual: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildStatistics {
    pub total_blocks: u64,
    pub unique_blocks: u64,
    pub height: u64,
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub quest_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    pub valid: bool,
    pub checks: BTreeMap<String, Check>,
    pub statistics: BuildStatistics,
}

/// Validate a build against requirements. Every rule gets its own named
/// check in the report so the game can show the player what fell short.
pub fn validate_build(
    quest_id: &str,
    challenge_id: Option<&str>,
    requirements: &Requirements,
    rules: &ValidationRules,
    build: &BuildData,
) -> ValidationReport {
    let total_blocks: u64 = build.blocks.values().sum();
    let unique_blocks = build.blocks.len() as u64;

    let mut checks = BTreeMap::new();
    let mut valid = true;

    let mut record = |name: &str, required: u64, actual: u64, options: Option<Vec<String>>| {
        let pass = actual >= required;
        valid &= pass;
        checks.insert(
            name.to_string(),
            Check {
                pass,
                required,
                actual,
                options,
            },
        );
    };

    record("min_blocks", requirements.min_blocks, total_blocks, None);
    record("min_height", requirements.min_height, build.height, None);

    for (block_type, requirement) in &requirements.required_block_types {
        match &requirement.any_of {
            Some(options) => {
                let actual: u64 = options
                    .iter()
                    .filter_map(|b| build.blocks.get(b))
                    .sum();
                let shown = if actual < requirement.min {
                    Some(options.clone())
                } else {
                    None
                };
                record(block_type, requirement.min, actual, shown);
            }
            None => {
                let actual = build.blocks.get(block_type).copied().unwrap_or(0);
                record(block_type, requirement.min, actual, None);
            }
        }
    }

    if let Some(min_unique) = rules.min_unique_blocks {
        record("unique_blocks", min_unique, unique_blocks, None);
    }

    ValidationReport {
        quest_id: quest_id.to_string(),
        challenge_id: challenge_id.map(str::to_string),
        valid,
        checks,
        statistics: BuildStatistics {
            total_blocks,
            unique_blocks,
            height: build.height,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn garden_requirements() -> Requirements {
        let mut required = BTreeMap::new();
        required.insert(
            "flowers".to_string(),
            BlockRequirement {
                min: 10,
                any_of: Some(vec![
                    "minecraft:poppy".to_string(),
                    "minecraft:dandelion".to_string(),
                ]),
            },
        );
        required.insert(
            "minecraft:oak_fence".to_string(),
            BlockRequirement {
                min: 8,
                any_of: None,
            },
        );
        Requirements {
            min_blocks: 30,
            min_height: 2,
            required_block_types: required,
        }
    }

    fn build(entries: &[(&str, u64)], height: u64) -> BuildData {
        BuildData {
            blocks: entries
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            height,
        }
    }

    #[test]
    fn passing_build_passes_every_check() {
        let report = validate_build(
            "q1",
            Some("garden"),
            &garden_requirements(),
            &ValidationRules {
                min_unique_blocks: Some(3),
            },
            &build(
                &[
                    ("minecraft:poppy", 6),
                    ("minecraft:dandelion", 5),
                    ("minecraft:oak_fence", 12),
                    ("minecraft:grass_block", 20),
                ],
                3,
            ),
        );

        assert!(report.valid);
        assert!(report.checks.values().all(|c| c.pass));
        assert_eq!(report.statistics.total_blocks, 43);
        assert_eq!(report.statistics.unique_blocks, 4);
    }

    #[test]
    fn any_of_group_sums_across_options() {
        let report = validate_build(
            "q1",
            None,
            &garden_requirements(),
            &ValidationRules::default(),
            &build(
                &[
                    ("minecraft:poppy", 4),
                    ("minecraft:dandelion", 3),
                    ("minecraft:oak_fence", 30),
                ],
                5,
            ),
        );

        let flowers = &report.checks["flowers"];
        assert!(!flowers.pass);
        assert_eq!(flowers.actual, 7);
        assert!(flowers.options.is_some());
        assert!(!report.valid);
    }

    #[test]
    fn height_shortfall_fails_only_that_check() {
        let report = validate_build(
            "q1",
            None,
            &Requirements {
                min_blocks: 5,
                min_height: 10,
                required_block_types: BTreeMap::new(),
            },
            &ValidationRules::default(),
            &build(&[("minecraft:stone", 40)], 4),
        );

        assert!(report.checks["min_blocks"].pass);
        assert!(!report.checks["min_height"].pass);
        assert!(!report.valid);
    }

    #[test]
    fn unique_blocks_rule_is_optional() {
        let requirements = Requirements::default();
        let data = build(&[("minecraft:stone", 1)], 1);

        let without = validate_build("q1", None, &requirements, &ValidationRules::default(), &data);
        assert!(!without.checks.contains_key("unique_blocks"));

        let with = validate_build(
            "q1",
            None,
            &requirements,
            &ValidationRules {
                min_unique_blocks: Some(2),
            },
            &data,
        );
        assert!(!with.checks["unique_blocks"].pass);
    }

    #[test]
    fn affinity_filter() {
        let template = ChallengeTemplate {
            id: "garden".to_string(),
            title: "A Garden for the Village".to_string(),
            description: "Plant something beautiful.".to_string(),
            difficulty: "easy".to_string(),
            giver_affinity: vec!["rowan".to_string(), "sage".to_string()],
            requirements: Requirements::default(),
            reward: Reward::Lore {
                content: "The blocks remember.".to_string(),
            },
            validation: ValidationRules::default(),
        };

        assert!(template.suits("rowan"));
        assert!(!template.suits("marina"));
    }
}
