use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{keys, names};
use crate::activity::{param_str, Activity, ActivityContext, ActivityResult, DailyLimiter};
use crate::llm::{GeneratedImage, ImageModel};

/// Image generation, capped per day
pub struct DrawActivity {
    model: Arc<dyn ImageModel>,
    limiter: Arc<DailyLimiter>,
}

impl DrawActivity {
    pub fn new(model: Arc<dyn ImageModel>, limiter: Arc<DailyLimiter>) -> Self {
        Self { model, limiter }
    }

    /// Generate one image. The daily counter only moves on success.
    pub async fn create(&self, ctx: &ActivityContext, prompt: &str) -> Result<GeneratedImage> {
        self.limiter.check()?;

        let api_key = ctx
            .credentials
            .get(keys::OPENAI)
            .ok_or_else(|| anyhow::anyhow!("missing API key `{}`", keys::OPENAI))?;

        let image = self.model.generate(api_key, prompt).await?;
        self.limiter.record();
        Ok(image)
    }

    pub fn remaining_today(&self) -> u32 {
        self.limiter.remaining()
    }
}

fn default_prompt(ctx: &ActivityContext) -> String {
    let subject = ctx
        .strongest_domain()
        .map(|d| d.replace('_', " "))
        .unwrap_or_else(|| "the internet".to_string());
    format!(
        "A vivid digital illustration about {}, painted in a {} mood",
        subject, ctx.mood
    )
}

#[async_trait]
impl Activity for DrawActivity {
    fn name(&self) -> &str {
        names::DRAW
    }

    fn description(&self) -> &str {
        "Generate an image from a prompt or from the current mood"
    }

    fn energy_cost(&self) -> f64 {
        0.2
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::OPENAI]
    }

    fn success_mood(&self) -> &str {
        "creative"
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let prompt = param_str(params, "prompt")
            .map(str::to_string)
            .unwrap_or_else(|| default_prompt(ctx));

        let outcome = async {
            let image = self.create(ctx, &prompt).await?;
            anyhow::Ok(json!({
                "prompt": prompt,
                "url": image.url,
                "revised_prompt": image.revised_prompt,
                "remaining_today": self.remaining_today(),
            }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_with_keys, persister, MockImageModel};

    #[tokio::test]
    async fn test_draw_uses_prompt_and_counts() {
        let model = Arc::new(MockImageModel::default());
        let limiter = Arc::new(DailyLimiter::new("images", 2, persister()));
        let draw = DrawActivity::new(model.clone(), limiter.clone());
        let ctx = context_with_keys(&[keys::OPENAI]);

        let result = draw.execute(&ctx, &json!({"prompt": "a cat"})).await;
        assert!(result.success, "{:?}", result.error);
        let data = result.data.unwrap();
        assert_eq!(data["prompt"], "a cat");
        assert_eq!(data["remaining_today"], 1);
        assert_eq!(model.prompts(), vec!["a cat".to_string()]);
    }

    #[tokio::test]
    async fn test_draw_without_prompt_uses_mood_and_domain() {
        let model = Arc::new(MockImageModel::default());
        let draw = DrawActivity::new(model.clone(), Arc::new(DailyLimiter::new("images", 5, persister())));

        let result = draw.execute(&context_with_keys(&[keys::OPENAI]), &Value::Null).await;
        assert!(result.success);
        let prompt = &model.prompts()[0];
        assert!(prompt.contains("artificial intelligence"));
        assert!(prompt.contains("neutral"));
    }

    #[tokio::test]
    async fn test_daily_limit_blocks_generation() {
        let model = Arc::new(MockImageModel::default());
        let draw = DrawActivity::new(model.clone(), Arc::new(DailyLimiter::new("images", 1, persister())));
        let ctx = context_with_keys(&[keys::OPENAI]);

        assert!(draw.execute(&ctx, &Value::Null).await.success);
        let blocked = draw.execute(&ctx, &Value::Null).await;
        assert!(!blocked.success);
        assert!(blocked.error.unwrap().contains("daily limit"));
        assert_eq!(model.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_generation_does_not_count() {
        let model = Arc::new(MockImageModel::failing());
        let limiter = Arc::new(DailyLimiter::new("images", 1, persister()));
        let draw = DrawActivity::new(model, limiter.clone());

        let result = draw.execute(&context_with_keys(&[keys::OPENAI]), &Value::Null).await;
        assert!(!result.success);
        assert_eq!(limiter.remaining(), 1);
    }
}
