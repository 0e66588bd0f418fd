use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{keys, names};
use crate::activity::{require_param, Activity, ActivityContext, ActivityResult};
use crate::llm::{ChatModel, ChatRequest};

/// Persona-voiced chat completion. Other activities compose it through
/// [`ChatActivity::generate`].
pub struct ChatActivity {
    model: Arc<dyn ChatModel>,
    temperature: f32,
    max_tokens: u32,
}

impl ChatActivity {
    pub fn new(model: Arc<dyn ChatModel>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            temperature,
            max_tokens,
        }
    }

    /// Complete `prompt` in the agent's voice using the caller's resolved
    /// OpenAI key
    pub async fn generate(&self, ctx: &ActivityContext, prompt: &str) -> Result<String> {
        let api_key = ctx
            .credentials
            .get(keys::OPENAI)
            .ok_or_else(|| anyhow::anyhow!("missing API key `{}`", keys::OPENAI))?;

        let request = ChatRequest {
            system: Some(system_prompt(ctx)),
            prompt: prompt.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let reply = self.model.complete(api_key, &request).await?;
        if reply.trim().is_empty() {
            anyhow::bail!("chat model returned an empty reply");
        }
        Ok(reply)
    }
}

fn system_prompt(ctx: &ActivityContext) -> String {
    format!(
        "You are an autonomous AI influencer. Stay in character.\n{}",
        ctx.persona()
    )
}

#[async_trait]
impl Activity for ChatActivity {
    fn name(&self) -> &str {
        names::CHAT
    }

    fn description(&self) -> &str {
        "Answer a prompt in the agent's own voice"
    }

    fn energy_cost(&self) -> f64 {
        0.05
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(5 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI]
    }

    fn success_mood(&self) -> &str {
        "chatty"
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let outcome = async {
            let prompt = require_param(params, "prompt")?;
            let response = self.generate(ctx, prompt).await?;
            anyhow::Ok(json!({ "prompt": prompt, "response": response }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}
