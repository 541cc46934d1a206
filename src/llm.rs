//! LLM routing over local Ollama
//!
//! Routes chat requests to a model chosen by task type, with a fallback
//! model and context windowing so long conversations stay inside the small
//! local models' useful context.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::{store, Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What kind of output the caller needs; picks the model and memory window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    QuickResponse,
    Dialogue,
    QuestGeneration,
}

impl TaskType {
    pub fn key(self) -> &'static str {
        match self {
            TaskType::QuickResponse => "quick_response",
            TaskType::Dialogue => "dialogue",
            TaskType::QuestGeneration => "quest_generation",
        }
    }
}

/// One chat turn in Ollama's message format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskModels {
    pub preferred_model: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Router configuration, loadable from JSON with full defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub endpoint: String,
    pub keep_alive: String,
    pub context_optimization: bool,
    pub task_types: HashMap<String, TaskModels>,
    pub memory_window: HashMap<String, usize>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let mut task_types = HashMap::new();
        task_types.insert(
            "quick_response".to_string(),
            TaskModels {
                preferred_model: "llama3.2:latest".to_string(),
                fallback: Some("llama3.1:8b".to_string()),
            },
        );
        task_types.insert(
            "dialogue".to_string(),
            TaskModels {
                preferred_model: "llama3.1:8b".to_string(),
                fallback: Some("llama3.2:latest".to_string()),
            },
        );
        task_types.insert(
            "quest_generation".to_string(),
            TaskModels {
                preferred_model: "llama3.1:8b".to_string(),
                fallback: Some("llama3.2:latest".to_string()),
            },
        );

        let mut memory_window = HashMap::new();
        memory_window.insert("quick_response".to_string(), 3);
        memory_window.insert("dialogue".to_string(), 10);
        memory_window.insert("quest_generation".to_string(), 20);

        Self {
            endpoint: "http://localhost:11434".to_string(),
            keep_alive: "10m".to_string(),
            context_optimization: true,
            task_types,
            memory_window,
        }
    }
}

/// Ollama-backed router.
pub struct LlmRouter {
    client: reqwest::Client,
    config: RouterConfig,
}

impl LlmRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Load router config from a JSON file, overriding the endpoint with the
    /// server-level Ollama URL.
    pub fn from_config_file(path: &Path, ollama_url: &str) -> Self {
        let mut config: RouterConfig = store::load_or_default(path, RouterConfig::default);
        config.endpoint = ollama_url.to_string();
        Self::new(config)
    }

    fn select_model(&self, task: TaskType) -> (&str, Option<&str>) {
        match self.config.task_types.get(task.key()) {
            Some(models) => (&models.preferred_model, models.fallback.as_deref()),
            None => ("llama3.1:8b", None),
        }
    }

    /// Trim the conversation to the task's memory window. System messages
    /// always survive; the window counts exchange pairs.
    fn trim_context(&self, messages: &[ChatMessage], task: TaskType) -> Vec<ChatMessage> {
        let window = self
            .config
            .memory_window
            .get(task.key())
            .copied()
            .unwrap_or(10);

        let system: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.role == "system")
            .cloned()
            .collect();
        let mut conversation: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.role != "system")
            .cloned()
            .collect();

        let keep = window * 2;
        if conversation.len() > keep {
            conversation = conversation.split_off(conversation.len() - keep);
        }

        let mut trimmed = system;
        trimmed.extend(conversation);
        trimmed
    }

    async fn call_ollama(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.config.endpoint))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({
                "model": model,
                "messages": messages,
                "stream": false,
                "keep_alive": self.config.keep_alive,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: JsonValue = response.json().await?;
        body.pointer("/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Llm("Ollama response missing message content".to_string()))
    }

    /// Chat completion routed by task type, falling back to the secondary
    /// model when the preferred one fails.
    pub async fn chat(&self, messages: &[ChatMessage], task: TaskType) -> Result<String> {
        let (model, fallback) = self.select_model(task);

        let messages = if self.config.context_optimization {
            self.trim_context(messages, task)
        } else {
            messages.to_vec()
        };

        match self.call_ollama(model, &messages).await {
            Ok(text) => Ok(text),
            Err(primary) => {
                let Some(fallback) = fallback.filter(|f| *f != model) else {
                    return Err(primary);
                };
                tracing::warn!("Primary model {} failed, trying {}", model, fallback);
                self.call_ollama(fallback, &messages).await.map_err(|e| {
                    Error::Llm(format!("Both primary and fallback failed: {primary}, {e}"))
                })
            }
        }
    }

    /// Single-prompt completion constrained to JSON output, for structured
    /// generation (quests, NPC details).
    pub async fn generate_json(&self, model: &str, prompt: &str) -> Result<JsonValue> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.config.endpoint))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({
                "model": model,
                "prompt": prompt,
                "stream": false,
                "format": "json",
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: JsonValue = response.json().await?;
        let text = body
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Llm("Ollama response missing response field".to_string()))?;
        Ok(serde_json::from_str(text)?)
    }

    /// Single-prompt free-text completion.
    pub async fn generate_text(&self, model: &str, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.config.endpoint))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({
                "model": model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: JsonValue = response.json().await?;
        body.get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| Error::Llm("Ollama response missing response field".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(turns: usize) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system("You are Marina.")];
        for i in 0..turns {
            messages.push(ChatMessage::user(format!("question {i}")));
            messages.push(ChatMessage::assistant(format!("answer {i}")));
        }
        messages
    }

    #[test]
    fn trim_keeps_system_and_recent_turns() {
        let router = LlmRouter::new(RouterConfig::default());
        let messages = conversation(12);

        let trimmed = router.trim_context(&messages, TaskType::QuickResponse);
        // window 3 = 6 conversation messages + the system message
        assert_eq!(trimmed.len(), 7);
        assert_eq!(trimmed[0].role, "system");
        assert_eq!(trimmed.last().unwrap().content, "answer 11");
    }

    #[test]
    fn trim_leaves_short_conversations_alone() {
        let router = LlmRouter::new(RouterConfig::default());
        let messages = conversation(2);
        let trimmed = router.trim_context(&messages, TaskType::Dialogue);
        assert_eq!(trimmed.len(), messages.len());
    }

    #[test]
    fn model_selection_by_task() {
        let router = LlmRouter::new(RouterConfig::default());
        let (model, fallback) = router.select_model(TaskType::Dialogue);
        assert_eq!(model, "llama3.1:8b");
        assert_eq!(fallback, Some("llama3.2:latest"));
    }
}
