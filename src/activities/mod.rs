//! Built-in activities and the factory that wires them to their services.

use std::sync::Arc;

use crate::activity::{Activity, DailyLimiter};
use crate::github::CommitSource;
use crate::llm::{ChatModel, ImageModel};
use crate::memory::MemoryStore;
use crate::news::NewsFeed;
use crate::persistence::Persister;
use crate::social::SocialPoster;
use crate::web::PageFetcher;

mod chat;
mod commits;
mod diagnostic;
mod draw;
mod evaluate;
mod evolve;
mod headlines;
mod nap;
mod reflection;
mod scrape;
mod tweet;

pub use chat::ChatActivity;
pub use commits::AnalyzeCommitsActivity;
pub use diagnostic::TestActivity;
pub use draw::DrawActivity;
pub use evaluate::EvaluateActivity;
pub use evolve::{parse_suggestions, BuildOrUpdateActivity, Suggestion, SuggestNewActivitiesActivity};
pub use headlines::FetchNewsActivity;
pub use nap::NapActivity;
pub use reflection::{AnalyzeDailyActivity, DailyThoughtActivity};
pub use scrape::WebScrapeActivity;
pub use tweet::{PostRecentMemoriesTweetActivity, PostTweetActivity, PostTweetWithImageActivity};

/// Activity names. Referenced by constant everywhere so a typo fails to compile.
pub mod names {
    pub const CHAT: &str = "chat";
    pub const DRAW: &str = "draw";
    pub const WEB_SCRAPE: &str = "web-scrape";
    pub const POST_TWEET: &str = "post-tweet";
    pub const FETCH_NEWS: &str = "fetch-news";
    pub const NAP: &str = "nap";
    pub const DAILY_THOUGHT: &str = "daily-thought";
    pub const ANALYZE_DAILY: &str = "analyze-daily";
    pub const ANALYZE_COMMITS: &str = "analyze-commits";
    pub const EVALUATE: &str = "evaluate";
    pub const SUGGEST_NEW_ACTIVITIES: &str = "suggest-new-activities";
    pub const BUILD_OR_UPDATE: &str = "build-or-update";
    pub const POST_RECENT_MEMORIES_TWEET: &str = "post-recent-memories-tweet";
    pub const POST_TWEET_WITH_IMAGE: &str = "post-tweet-with-image";
    pub const TEST: &str = "test";

    pub const ALL: [&str; 15] = [
        CHAT,
        DRAW,
        WEB_SCRAPE,
        POST_TWEET,
        FETCH_NEWS,
        NAP,
        DAILY_THOUGHT,
        ANALYZE_DAILY,
        ANALYZE_COMMITS,
        EVALUATE,
        SUGGEST_NEW_ACTIVITIES,
        BUILD_OR_UPDATE,
        POST_RECENT_MEMORIES_TWEET,
        POST_TWEET_WITH_IMAGE,
        TEST,
    ];
}

/// Credential names activities declare
pub mod keys {
    pub const OPENAI: &str = "OPENAI";
    pub const TWITTER: &str = "TWITTER";
    pub const GITHUB: &str = "GITHUB";
    pub const NEWSAPI: &str = "NEWSAPI";
}

/// Third-party capabilities injected into activities
#[derive(Clone)]
pub struct Services {
    pub chat_model: Arc<dyn ChatModel>,
    pub image_model: Arc<dyn ImageModel>,
    pub poster: Arc<dyn SocialPoster>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub news: Arc<dyn NewsFeed>,
    pub commits: Arc<dyn CommitSource>,
}

/// Tunables for the built-in catalogue
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub daily_images: u32,
    pub daily_tweets: u32,
    pub scrape_urls: Vec<String>,
    pub github_repo: Option<String>,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 500,
            daily_images: 10,
            daily_tweets: 17,
            scrape_urls: Vec::new(),
            github_repo: None,
        }
    }
}

/// Build the full catalogue. Composite activities share the chat and draw
/// instances and the tweet counter.
pub fn default_activities(
    services: &Services,
    settings: &ActivitySettings,
    memory: Arc<MemoryStore>,
    persister: Arc<Persister>,
) -> Vec<Arc<dyn Activity>> {
    let image_limit = Arc::new(DailyLimiter::new("images", settings.daily_images, persister.clone()));
    let tweet_limit = Arc::new(DailyLimiter::new("tweets", settings.daily_tweets, persister));

    let chat = Arc::new(ChatActivity::new(
        services.chat_model.clone(),
        settings.temperature,
        settings.max_tokens,
    ));
    let draw = Arc::new(DrawActivity::new(services.image_model.clone(), image_limit));
    let known: Vec<String> = names::ALL.iter().map(|n| n.to_string()).collect();

    vec![
        chat.clone() as Arc<dyn Activity>,
        draw.clone(),
        Arc::new(WebScrapeActivity::new(services.fetcher.clone(), settings.scrape_urls.clone())),
        Arc::new(PostTweetActivity::new(chat.clone(), services.poster.clone(), tweet_limit.clone())),
        Arc::new(FetchNewsActivity::new(services.news.clone())),
        Arc::new(NapActivity),
        Arc::new(DailyThoughtActivity::new(chat.clone())),
        Arc::new(AnalyzeDailyActivity::new(chat.clone(), memory.clone())),
        Arc::new(AnalyzeCommitsActivity::new(
            chat.clone(),
            services.commits.clone(),
            settings.github_repo.clone(),
        )),
        Arc::new(EvaluateActivity::new(memory.clone())),
        Arc::new(SuggestNewActivitiesActivity::new(chat.clone(), known.clone())),
        Arc::new(BuildOrUpdateActivity::new(chat.clone(), memory.clone(), known)),
        Arc::new(PostRecentMemoriesTweetActivity::new(
            chat.clone(),
            services.poster.clone(),
            tweet_limit.clone(),
            memory,
        )),
        Arc::new(PostTweetWithImageActivity::new(chat, draw, services.poster.clone(), tweet_limit)),
        Arc::new(TestActivity),
    ]
}
