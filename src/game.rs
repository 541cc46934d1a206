//! Outbound commands to the game-side mod
//!
//! The Fabric mod exposes a small `/command` endpoint; everything here is
//! best-effort fire-and-forget, since losing an ambient chat line or a
//! reward item must never fail the operation that produced it.

use std::time::Duration;

use serde_json::{json, Value as JsonValue};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the game command endpoint.
#[derive(Clone)]
pub struct GameCommander {
    client: reqwest::Client,
    base_url: String,
}

impl GameCommander {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn send_command(&self, command_type: &str, data: JsonValue) {
        let result = self
            .client
            .post(format!("{}/command", self.base_url))
            .timeout(COMMAND_TIMEOUT)
            .json(&json!({"type": command_type, "data": data}))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!("Game command '{}' failed: {}", command_type, response.status());
            }
            Err(e) => {
                tracing::warn!("Failed to send '{}' to game bridge: {}", command_type, e);
            }
        }
    }

    /// Show a chat message to one player.
    pub async fn send_chat(&self, player: &str, message: &str) {
        self.send_command(
            "send_chat",
            json!({"player": player, "message": message}),
        )
        .await;
    }

    /// Give an item stack to a player.
    pub async fn give_item(&self, player: &str, item: &str, count: u32) {
        self.send_command(
            "give_item",
            json!({"player": player, "item": item, "count": count}),
        )
        .await;
    }

    /// Grant experience points to a player.
    pub async fn give_xp(&self, player: &str, amount: u32) {
        self.send_command("give_xp", json!({"player": player, "amount": amount}))
            .await;
    }
}
