use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{keys, names};
use crate::activity::{param_str, Activity, ActivityContext, ActivityResult};
use crate::news::NewsFeed;

const HEADLINE_LIMIT: usize = 5;

pub struct FetchNewsActivity {
    news: Arc<dyn NewsFeed>,
}

impl FetchNewsActivity {
    pub fn new(news: Arc<dyn NewsFeed>) -> Self {
        Self { news }
    }
}

#[async_trait]
impl Activity for FetchNewsActivity {
    fn name(&self) -> &str {
        names::FETCH_NEWS
    }

    fn description(&self) -> &str {
        "Pull the latest headlines for a topic the agent cares about"
    }

    fn energy_cost(&self) -> f64 {
        0.05
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(2 * 60 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::NEWSAPI]
    }

    fn success_mood(&self) -> &str {
        "informed"
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let topic = param_str(params, "topic")
            .map(str::to_string)
            .or_else(|| ctx.strongest_domain().map(|d| d.replace('_', " ")))
            .unwrap_or_else(|| "technology".to_string());

        let outcome = async {
            let api_key = ctx
                .credentials
                .get(keys::NEWSAPI)
                .ok_or_else(|| anyhow::anyhow!("missing API key `{}`", keys::NEWSAPI))?;
            let headlines = self.news.headlines(api_key, &topic, HEADLINE_LIMIT).await?;
            anyhow::Ok(json!({
                "topic": topic,
                "count": headlines.len(),
                "headlines": headlines,
            }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}
