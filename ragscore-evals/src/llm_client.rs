// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Language-model and embedding client abstractions used by the metrics

use async_trait::async_trait;
use futures::future::try_join_all;
use ragscore_prompts::{PromptError, Translator};
use std::sync::Arc;
use thiserror::Error;

/// Trait for judge models
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate `n` completions for every prompt.
    ///
    /// The outer vector is aligned with `prompts`; each inner vector holds
    /// exactly `n` completions.
    async fn generate(&self, prompts: &[String], n: usize) -> Result<Vec<Vec<String>>, LLMError>;

    /// Check that credentials are present before any request is made
    fn validate_credentials(&self) -> Result<(), LLMError> {
        Ok(())
    }

    fn model_name(&self) -> &str;
}

/// Errors from LLM clients
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LLMError {
    /// Credential problems are configuration errors, not transient failures
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            LLMError::MissingCredential(_) | LLMError::InvalidCredential(_)
        )
    }
}

/// Errors from embedding clients
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Trait for embedding clients used in evaluations.
///
/// Vectors from both methods must share one dimensionality.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f64>, EmbedError>;

    /// Embed a batch of texts, one vector per input in order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError>;

    fn validate_credentials(&self) -> Result<(), EmbedError> {
        Ok(())
    }
}

/// OpenAI client implementation
pub struct OpenAIClient {
    api_key: String,
    model: String,
    embedding_model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_embedding_model(mut self, embedding_model: String) -> Self {
        self.embedding_model = embedding_model;
        self
    }

    fn has_key(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != "no-key"
    }

    async fn complete(&self, prompt: &str, n: usize) -> Result<Vec<String>, LLMError> {
        // Several samples per prompt need a non-zero temperature
        let temperature = if n > 1 { 0.2 } else { 0.0 };
        let request = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "n": n,
            "temperature": temperature
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(match status {
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    LLMError::InvalidCredential(error_text)
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimitExceeded,
                _ => LLMError::ApiError(error_text),
            });
        }

        let response_data: serde_json::Value = response.json().await?;
        let choices = response_data["choices"]
            .as_array()
            .ok_or_else(|| LLMError::InvalidResponse("Missing choices".to_string()))?;

        let mut completions = Vec::with_capacity(choices.len());
        for (position, choice) in choices.iter().enumerate() {
            let index = choice["index"].as_u64().unwrap_or(position as u64);
            let content = choice["message"]["content"]
                .as_str()
                .ok_or_else(|| LLMError::InvalidResponse("Missing content".to_string()))?;
            completions.push((index, content.to_string()));
        }
        completions.sort_by_key(|(index, _)| *index);

        if completions.len() != n {
            return Err(LLMError::InvalidResponse(format!(
                "Expected {} completions, got {}",
                n,
                completions.len()
            )));
        }

        Ok(completions.into_iter().map(|(_, c)| c).collect())
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, prompts: &[String], n: usize) -> Result<Vec<Vec<String>>, LLMError> {
        LLMClient::validate_credentials(self)?;
        if n == 0 {
            return Ok(vec![Vec::new(); prompts.len()]);
        }
        try_join_all(prompts.iter().map(|prompt| self.complete(prompt, n))).await
    }

    fn validate_credentials(&self) -> Result<(), LLMError> {
        if self.has_key() {
            Ok(())
        } else {
            Err(LLMError::MissingCredential(
                "OpenAI API key is not set".to_string(),
            ))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingClient for OpenAIClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        let embeddings = self.embed_documents(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::ApiError("No embedding returned".to_string()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        EmbeddingClient::validate_credentials(self)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = serde_json::json!({
            "model": self.embedding_model,
            "input": texts
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(match status {
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    EmbedError::InvalidCredential(error_text)
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => EmbedError::RateLimitExceeded,
                _ => EmbedError::ApiError(error_text),
            });
        }

        let response_data: serde_json::Value = response.json().await?;

        let mut embeddings = Vec::new();
        if let Some(data) = response_data["data"].as_array() {
            for (position, item) in data.iter().enumerate() {
                if let Some(embedding_vec) = item["embedding"].as_array() {
                    let index = item["index"].as_u64().unwrap_or(position as u64);
                    let vec: Vec<f64> = embedding_vec.iter().filter_map(|v| v.as_f64()).collect();
                    embeddings.push((index, vec));
                }
            }
        }
        embeddings.sort_by_key(|(index, _)| *index);

        if embeddings.len() != texts.len() {
            return Err(EmbedError::ApiError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings.into_iter().map(|(_, v)| v).collect())
    }

    fn validate_credentials(&self) -> Result<(), EmbedError> {
        if self.has_key() {
            Ok(())
        } else {
            Err(EmbedError::MissingCredential(
                "OpenAI API key is not set".to_string(),
            ))
        }
    }
}

/// Uses a judge model to translate prompt templates
pub struct LlmTranslator {
    llm_client: Arc<dyn LLMClient>,
}

impl LlmTranslator {
    pub fn new(llm_client: Arc<dyn LLMClient>) -> Self {
        Self { llm_client }
    }

    fn translation_prompt(text: &str, language: &str) -> String {
        format!(
            r#"Translate the following text to {language}.
Keep names, numbers, punctuation and formatting unchanged.
Respond with the translation only.

TEXT:
{text}"#
        )
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(
        &self,
        texts: Vec<String>,
        language: &str,
    ) -> Result<Vec<String>, PromptError> {
        let prompts: Vec<String> = texts
            .iter()
            .map(|t| Self::translation_prompt(t, language))
            .collect();

        let generations = self
            .llm_client
            .generate(&prompts, 1)
            .await
            .map_err(|e| PromptError::Translation(e.to_string()))?;

        generations
            .into_iter()
            .map(|completions| {
                completions
                    .into_iter()
                    .next()
                    .map(|c| c.trim().to_string())
                    .ok_or_else(|| PromptError::Translation("Empty translation".to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_missing_key_is_credential_error() {
        let client = OpenAIClient::new(String::new(), "gpt-4o-mini".to_string());
        let err = LLMClient::validate_credentials(&client).unwrap_err();
        assert!(err.is_credential_error());

        let client = OpenAIClient::new("no-key".to_string(), "gpt-4o-mini".to_string());
        assert!(matches!(
            EmbeddingClient::validate_credentials(&client),
            Err(EmbedError::MissingCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_orders_choices_by_index() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({"n": 2})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices": [
                    {"index": 1, "message": {"role": "assistant", "content": "second"}},
                    {"index": 0, "message": {"role": "assistant", "content": "first"}}
                ]}"#,
            )
            .expect(2)
            .create_async()
            .await;

        let client = OpenAIClient::new("test-key".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(server.url());
        let prompts = vec!["a".to_string(), "b".to_string()];
        let generations = client.generate(&prompts, 2).await.unwrap();

        assert_eq!(generations.len(), 2);
        assert_eq!(generations[0], vec!["first", "second"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let client = OpenAIClient::new("bad-key".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(server.url());
        let err = client.generate(&["a".to_string()], 1).await.unwrap_err();
        assert!(matches!(err, LLMError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_generate_rejects_short_choice_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"index": 0, "message": {"content": "only"}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new("test-key".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(server.url());
        let err = client.generate(&["a".to_string()], 3).await.unwrap_err();
        assert!(matches!(err, LLMError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_embed_documents() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .match_body(Matcher::PartialJson(
                serde_json::json!({"model": "text-embedding-3-small"}),
            ))
            .with_status(200)
            .with_body(
                r#"{"data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]}"#,
            )
            .create_async()
            .await;

        let client = OpenAIClient::new("test-key".to_string(), "gpt-4o-mini".to_string())
            .with_base_url(server.url());
        let vectors = client
            .embed_documents(&["x".to_string(), "y".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    struct EchoClient;

    #[async_trait]
    impl LLMClient for EchoClient {
        async fn generate(
            &self,
            prompts: &[String],
            n: usize,
        ) -> Result<Vec<Vec<String>>, LLMError> {
            Ok(prompts
                .iter()
                .map(|p| {
                    let text = p.rsplit("TEXT:\n").next().unwrap_or_default();
                    vec![format!(" {} ", text.to_uppercase()); n]
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_llm_translator() {
        let translator = LlmTranslator::new(Arc::new(EchoClient));
        let translated = translator
            .translate(vec!["hello".to_string(), "world".to_string()], "german")
            .await
            .unwrap();
        assert_eq!(translated, vec!["HELLO", "WORLD"]);
    }
}
