use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::names;
use crate::activity::{param_str, Activity, ActivityContext, ActivityResult};
use crate::web::{excerpt, extract_title, visible_text, PageFetcher};

const EXCERPT_CHARS: usize = 500;

pub struct WebScrapeActivity {
    fetcher: Arc<dyn PageFetcher>,
    urls: Vec<String>,
}

impl WebScrapeActivity {
    pub fn new(fetcher: Arc<dyn PageFetcher>, urls: Vec<String>) -> Self {
        Self { fetcher, urls }
    }

    fn pick_url(&self, params: &Value) -> Option<String> {
        param_str(params, "url")
            .map(str::to_string)
            .or_else(|| self.urls.choose(&mut rand::thread_rng()).cloned())
    }
}

#[async_trait]
impl Activity for WebScrapeActivity {
    fn name(&self) -> &str {
        names::WEB_SCRAPE
    }

    fn description(&self) -> &str {
        "Fetch a web page and keep its title and a text excerpt"
    }

    fn energy_cost(&self) -> f64 {
        0.1
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(30 * 60)
    }

    fn success_mood(&self) -> &str {
        "curious"
    }

    async fn execute(&self, _ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let Some(url) = self.pick_url(params) else {
            return ActivityResult::failure("no `url` given and no scrape URLs configured");
        };

        let outcome = async {
            let page = self.fetcher.fetch(&url).await?;
            let text = visible_text(&page.body);
            anyhow::Ok(json!({
                "url": page.url,
                "status": page.status,
                "title": extract_title(&page.body),
                "excerpt": excerpt(&text, EXCERPT_CHARS),
                "characters": text.chars().count(),
            }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_with_keys, StaticFetcher};

    #[tokio::test]
    async fn test_scrape_extracts_title_and_excerpt() {
        let fetcher = Arc::new(StaticFetcher::new(
            "<html><title>Agent News</title><body><p>Agents are everywhere.</p></body></html>",
        ));
        let activity = WebScrapeActivity::new(fetcher.clone(), vec![]);

        let result = activity
            .execute(&context_with_keys(&[]), &json!({"url": "https://example.com"}))
            .await;
        assert!(result.success, "{:?}", result.error);
        let data = result.data.unwrap();
        assert_eq!(data["title"], "Agent News");
        assert!(data["excerpt"].as_str().unwrap().contains("Agents are everywhere."));
        assert_eq!(fetcher.urls(), vec!["https://example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_scrape_falls_back_to_configured_urls() {
        let fetcher = Arc::new(StaticFetcher::new("<p>hi</p>"));
        let activity = WebScrapeActivity::new(fetcher.clone(), vec!["https://configured".to_string()]);

        assert!(activity.execute(&context_with_keys(&[]), &Value::Null).await.success);
        assert_eq!(fetcher.urls(), vec!["https://configured".to_string()]);
    }

    #[tokio::test]
    async fn test_scrape_without_any_url_fails() {
        let activity = WebScrapeActivity::new(Arc::new(StaticFetcher::new("")), vec![]);
        let result = activity.execute(&context_with_keys(&[]), &Value::Null).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("url"));
    }
}
