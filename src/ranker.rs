//! Review ranking.
//!
//! Turns a free-text admin review into one of the ranking names stored in the
//! catalog. The production ranker asks an OpenAI-compatible chat completion
//! endpoint to classify the review.

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::db::{NOT_RANKED_VALUE, Ranking};

pub const DEFAULT_RANKER_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_RANKER_MODEL: &str = "deepseek-chat";
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Return a response using one of these words: {rankings}. \
The response should be a single word and should not contain any other text. \
The response should be based on the following review: ";

/// Placeholder in the prompt template replaced by the candidate ranking names.
const RANKINGS_PLACEHOLDER: &str = "{rankings}";

#[derive(Debug)]
pub enum RankerError {
    /// No ranker has been configured.
    NotConfigured,
    Request(reqwest::Error),
    /// The provider answered with a non-success status.
    Provider(String),
    EmptyResponse,
}

impl std::fmt::Display for RankerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankerError::NotConfigured => write!(f, "Review ranker is not configured"),
            RankerError::Request(e) => write!(f, "Ranker request failed: {}", e),
            RankerError::Provider(msg) => write!(f, "Ranker provider error: {}", msg),
            RankerError::EmptyResponse => write!(f, "Ranker returned no choices"),
        }
    }
}

impl std::error::Error for RankerError {}

impl From<reqwest::Error> for RankerError {
    fn from(e: reqwest::Error) -> Self {
        RankerError::Request(e)
    }
}

/// Classifies a review into one of the given rankings, returning its name.
pub trait ReviewRanker: Send + Sync {
    fn rank<'a>(
        &'a self,
        review: &'a str,
        rankings: &'a [Ranking],
    ) -> BoxFuture<'a, Result<String, RankerError>>;
}

/// Look up the value for a ranking name. Unknown names map to 0.
pub fn ranking_for(name: &str, rankings: &[Ranking]) -> Ranking {
    let value = rankings
        .iter()
        .find(|r| r.ranking_name == name)
        .map(|r| r.ranking_value)
        .unwrap_or(0);
    Ranking {
        ranking_value: value,
        ranking_name: name.to_string(),
    }
}

/// Fill the prompt template with the rankable names, skipping `Not_Ranked`.
pub fn build_prompt(template: &str, rankings: &[Ranking], review: &str) -> String {
    let names = rankings
        .iter()
        .filter(|r| r.ranking_value != NOT_RANKED_VALUE)
        .map(|r| r.ranking_name.as_str())
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{}", template.replacen(RANKINGS_PLACEHOLDER, &names, 1), review)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

/// Ranker backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionRanker {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    prompt_template: String,
}

impl ChatCompletionRanker {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            prompt_template: prompt_template.into(),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, RankerError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: [ChatMessage {
                    role: "user",
                    content: prompt,
                }],
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            error!(%status, "Ranker provider rejected request");
            return Err(RankerError::Provider(format!("{} {}", status, body)));
        }

        let data: ChatResponse = response.json().await?;
        let reply = data
            .choices
            .into_iter()
            .next()
            .ok_or(RankerError::EmptyResponse)?;
        let name = reply.message.content.trim().to_string();
        debug!(ranking = %name, "Review ranked");
        Ok(name)
    }
}

impl ReviewRanker for ChatCompletionRanker {
    fn rank<'a>(
        &'a self,
        review: &'a str,
        rankings: &'a [Ranking],
    ) -> BoxFuture<'a, Result<String, RankerError>> {
        Box::pin(async move {
            let prompt = build_prompt(&self.prompt_template, rankings, review);
            self.complete(&prompt).await
        })
    }
}

/// Used when no API key is configured. Every call fails.
pub struct UnconfiguredRanker;

impl ReviewRanker for UnconfiguredRanker {
    fn rank<'a>(
        &'a self,
        _review: &'a str,
        _rankings: &'a [Ranking],
    ) -> BoxFuture<'a, Result<String, RankerError>> {
        Box::pin(async { Err(RankerError::NotConfigured) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rankings() -> Vec<Ranking> {
        [
            (1, "Excellent"),
            (2, "Good"),
            (3, "Okay"),
            (999, "Not_Ranked"),
        ]
        .into_iter()
        .map(|(v, n)| Ranking {
            ranking_value: v,
            ranking_name: n.to_string(),
        })
        .collect()
    }

    #[test]
    fn test_prompt_lists_rankable_names() {
        let prompt = build_prompt("Pick {rankings}: ", &rankings(), "Loved it");
        assert_eq!(prompt, "Pick Excellent,Good,Okay: Loved it");
    }

    #[test]
    fn test_prompt_without_placeholder() {
        let prompt = build_prompt("Classify: ", &rankings(), "Meh");
        assert_eq!(prompt, "Classify: Meh");
    }

    #[test]
    fn test_ranking_lookup() {
        assert_eq!(ranking_for("Good", &rankings()).ranking_value, 2);

        let unknown = ranking_for("Superb", &rankings());
        assert_eq!(unknown.ranking_value, 0);
        assert_eq!(unknown.ranking_name, "Superb");
    }

    #[tokio::test]
    async fn test_unconfigured_ranker_fails() {
        let result = UnconfiguredRanker.rank("review", &rankings()).await;
        assert!(matches!(result, Err(RankerError::NotConfigured)));
    }
}
