use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{keys, names, ChatActivity};
use crate::activity::{param_str, Activity, ActivityContext, ActivityResult};
use crate::github::CommitSource;

const LOOKBACK_DAYS: i64 = 7;
const MAX_COMMITS: usize = 30;

/// Reviews recent commits on a GitHub repository
pub struct AnalyzeCommitsActivity {
    chat: Arc<ChatActivity>,
    commits: Arc<dyn CommitSource>,
    repo: Option<String>,
}

impl AnalyzeCommitsActivity {
    pub fn new(chat: Arc<ChatActivity>, commits: Arc<dyn CommitSource>, repo: Option<String>) -> Self {
        Self { chat, commits, repo }
    }
}

#[async_trait]
impl Activity for AnalyzeCommitsActivity {
    fn name(&self) -> &str {
        names::ANALYZE_COMMITS
    }

    fn description(&self) -> &str {
        "Summarize what changed in the agent's own repository this week"
    }

    fn energy_cost(&self) -> f64 {
        0.1
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(6 * 60 * 60)
    }

    fn required_credentials(&self) -> &[&'static str] {
        &[keys::GITHUB, keys::OPENAI]
    }

    fn success_mood(&self) -> &str {
        "focused"
    }

    async fn execute(&self, ctx: &ActivityContext, params: &Value) -> ActivityResult {
        let Some(repo) = param_str(params, "repo")
            .map(str::to_string)
            .or_else(|| self.repo.clone())
        else {
            return ActivityResult::failure("no `repo` given and no GitHub repository configured");
        };

        let outcome = async {
            let token = ctx
                .credentials
                .get(keys::GITHUB)
                .ok_or_else(|| anyhow::anyhow!("missing API key `{}`", keys::GITHUB))?;
            let since = Utc::now() - chrono::Duration::days(LOOKBACK_DAYS);
            let commits = self.commits.recent_commits(token, &repo, since, MAX_COMMITS).await?;

            if commits.is_empty() {
                return anyhow::Ok(json!({
                    "repo": repo,
                    "commit_count": 0,
                    "analysis": format!("No commits in the last {} days.", LOOKBACK_DAYS),
                }));
            }

            let log = commits
                .iter()
                .map(|c| format!("- {} {}", c.sha, c.message))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = format!(
                "These are the commits to {} from the last {} days:\n{}\n\n\
                 Describe the main themes of the work and what it says about where the project is heading.",
                repo, LOOKBACK_DAYS, log
            );
            let analysis = self.chat.generate(ctx, &prompt).await?;

            anyhow::Ok(json!({
                "repo": repo,
                "commit_count": commits.len(),
                "commits": commits,
                "analysis": analysis,
            }))
        };
        ActivityResult::from_outcome(outcome.await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_with_keys, MockChatModel, StaticCommits};

    fn chat(model: Arc<MockChatModel>) -> Arc<ChatActivity> {
        Arc::new(ChatActivity::new(model, 0.7, 200))
    }

    #[tokio::test]
    async fn test_analyzes_commit_messages() {
        let model = Arc::new(MockChatModel::new(vec!["Mostly refactoring."]));
        let source = Arc::new(StaticCommits::new(&["Refactor brain", "Add nap activity"]));
        let activity = AnalyzeCommitsActivity::new(chat(model.clone()), source, Some("me/agent".to_string()));

        let result = activity
            .execute(&context_with_keys(&[keys::OPENAI, keys::GITHUB]), &Value::Null)
            .await;
        assert!(result.success, "{:?}", result.error);
        let data = result.data.unwrap();
        assert_eq!(data["commit_count"], 2);
        assert_eq!(data["analysis"], "Mostly refactoring.");
        assert!(model.prompts()[0].contains("Add nap activity"));
    }

    #[tokio::test]
    async fn test_no_commits_skips_model() {
        let model = Arc::new(MockChatModel::new(vec!["unused"]));
        let activity = AnalyzeCommitsActivity::new(
            chat(model.clone()),
            Arc::new(StaticCommits::new(&[])),
            None,
        );

        let result = activity
            .execute(
                &context_with_keys(&[keys::OPENAI, keys::GITHUB]),
                &json!({"repo": "me/agent"}),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["commit_count"], 0);
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_requires_a_repository() {
        let activity = AnalyzeCommitsActivity::new(
            chat(Arc::new(MockChatModel::new(Vec::<&str>::new()))),
            Arc::new(StaticCommits::new(&[])),
            None,
        );
        let result = activity
            .execute(&context_with_keys(&[keys::OPENAI, keys::GITHUB]), &Value::Null)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("repo"));
    }
}
