//! Answer generation from retrieved passages.
//!
//! - **[`ExtractiveGenerator`]**: answers with the retrieved sentences that
//!   best match the question. No network access.
//! - **[`ChatCompletionGenerator`]**: sends the passages and question to an
//!   OpenAI-compatible `POST {base_url}/chat/completions` endpoint.
//!
//! # Retry Strategy
//!
//! The chat completion generator retries transient failures:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, ... (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::QueryError;
use crate::index::{terms, Hit};

const SYSTEM_PROMPT: &str = "You answer questions about the user's documents. \
Use only the provided context. If the context does not contain the answer, say that you don't know. \
Answer in at most three sentences.";

/// Produces an answer to `question` from retrieved `passages`.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, question: &str, passages: &[Hit]) -> Result<String, QueryError>;
}

/// Create the generator selected by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveGenerator::default())),
        "openai" => Ok(Arc::new(ChatCompletionGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

// ============ Extractive ============

/// Answers with up to `max_sentences` sentences from the passages, chosen by
/// query-term overlap and returned in passage order.
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self { max_sentences: 3 }
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, question: &str, passages: &[Hit]) -> Result<String, QueryError> {
        let query_terms: HashSet<String> = terms(question).into_iter().collect();

        let sentences: Vec<&str> = passages
            .iter()
            .flat_map(|p| split_sentences(&p.text))
            .collect();
        if sentences.is_empty() {
            return Err(QueryError::Generation("no context to answer from".to_string()));
        }

        let mut scored: Vec<(usize, usize)> = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let overlap = terms(s)
                    .into_iter()
                    .collect::<HashSet<_>>()
                    .intersection(&query_terms)
                    .count();
                (i, overlap)
            })
            .filter(|&(_, overlap)| overlap > 0)
            .collect();

        // Nothing overlaps (e.g. "summarize it"): lead with the first sentences.
        if scored.is_empty() {
            scored = (0..sentences.len()).map(|i| (i, 0)).collect();
        }

        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(self.max_sentences);
        scored.sort_by_key(|&(i, _)| i);

        Ok(scored
            .into_iter()
            .map(|(i, _)| sentences[i])
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Split on sentence terminators and line breaks, trimming each piece.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => true,
            '.' | '?' | '!' => chars.peek().map_or(true, |&(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

// ============ OpenAI-compatible chat completions ============

/// Generator backed by an OpenAI-compatible chat completions API.
///
/// Sends `Authorization: Bearer $OPENAI_API_KEY` when the variable is set,
/// so keyless local servers work too.
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl ChatCompletionGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for openai provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model,
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            max_retries: config.max_retries,
        })
    }

    async fn complete(&self, body: &serde_json::Value) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying chat completion");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.endpoint).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, "chat completion failed; will retry");
                        last_err = Some(anyhow::anyhow!("API error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("API error {}: {}", status, body_text);
                }
                Err(e) => {
                    warn!(error = %e, "chat completion request failed; will retry");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("chat completion failed after retries")))
    }
}

#[async_trait]
impl Generator for ChatCompletionGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, passages: &[Hit]) -> Result<String, QueryError> {
        let body = completion_request(&self.model, question, passages);
        self.complete(&body)
            .await
            .map_err(|e| QueryError::Generation(format!("{:#}", e)))
    }
}

fn completion_request(model: &str, question: &str, passages: &[Hit]) -> serde_json::Value {
    let context = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    serde_json::json!({
        "model": model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            {
                "role": "user",
                "content": format!("Context:\n{}\n\nQuestion: {}", context, question)
            }
        ]
    })
}

/// Extract `choices[0].message.content` from a chat completion response.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion response: missing content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str) -> Hit {
        Hit {
            text: text.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn sentences_split_on_terminators_and_newlines() {
        assert_eq!(
            split_sentences("One. Two? Three!\nFour v1.2 ok"),
            vec!["One.", "Two?", "Three!", "Four v1.2 ok"]
        );
    }

    #[tokio::test]
    async fn extractive_prefers_matching_sentences() {
        let generator = ExtractiveGenerator::default();
        let answer = generator
            .generate(
                "How long do refunds take?",
                &[hit("Shipping is free. Refunds take 30 days. Call us anytime.")],
            )
            .await
            .unwrap();
        assert_eq!(answer, "Refunds take 30 days.");
    }

    #[tokio::test]
    async fn extractive_falls_back_to_leading_sentences() {
        let generator = ExtractiveGenerator { max_sentences: 2 };
        let answer = generator
            .generate("summarize it", &[hit("First. Second. Third.")])
            .await
            .unwrap();
        assert_eq!(answer, "First. Second.");
    }

    #[tokio::test]
    async fn extractive_without_passages_fails() {
        let err = ExtractiveGenerator::default()
            .generate("anything", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Generation(_)));
    }

    #[test]
    fn completion_request_carries_context_and_question() {
        let body = completion_request("m", "Why?", &[hit("Because."), hit("Also.")]);
        assert_eq!(body["model"], "m");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("Because.\n\n---\n\nAlso."));
        assert!(user.ends_with("Question: Why?"));
    }

    #[test]
    fn parse_completion_reads_first_choice() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": " It says X. " } }]
        });
        assert_eq!(parse_completion(&json).unwrap(), "It says X.");
        assert!(parse_completion(&serde_json::json!({})).is_err());
    }

    #[test]
    fn openai_generator_requires_model() {
        let config = GenerationConfig {
            provider: "openai".to_string(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
