//! The external quiz backend: topic extraction, question generation,
//! translation, and email delivery over multipart HTTP.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use shared::domain::{Difficulty, Question};
use shared::error::{BackendDetail, BackendStatusError};
use shared::protocol::{EmailReceipt, ExtractTopicsResponse, WireQuestion};
use tracing::warn;

use crate::config::Settings;

#[derive(Debug, Clone)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Attachment filename and content.
    pub attachment: Option<(String, Vec<u8>)>,
}

#[async_trait]
pub trait QuizBackend: Send + Sync {
    async fn extract_topics(&self, filename: &str, bytes: Vec<u8>) -> Result<Vec<String>>;
    async fn generate_questions(
        &self,
        topics: &[String],
        difficulty: Difficulty,
        count: u32,
    ) -> Result<Vec<Question>>;
    async fn generate_failed_topic_questions(
        &self,
        topics: &[String],
        per_topic: u32,
    ) -> Result<Vec<Question>>;
    async fn translate_questions(
        &self,
        questions: &[Question],
        target_language: &str,
    ) -> Result<Vec<Question>>;
    async fn send_email(&self, request: EmailRequest) -> Result<EmailReceipt>;
}

/// Stand-in wired by default in tests of the pure state machine; every call
/// fails, which exercises the controller's degraded paths.
pub struct MissingQuizBackend;

#[async_trait]
impl QuizBackend for MissingQuizBackend {
    async fn extract_topics(&self, _filename: &str, _bytes: Vec<u8>) -> Result<Vec<String>> {
        Err(anyhow!("quiz backend is not configured"))
    }

    async fn generate_questions(
        &self,
        _topics: &[String],
        _difficulty: Difficulty,
        _count: u32,
    ) -> Result<Vec<Question>> {
        Err(anyhow!("quiz backend is not configured"))
    }

    async fn generate_failed_topic_questions(
        &self,
        _topics: &[String],
        _per_topic: u32,
    ) -> Result<Vec<Question>> {
        Err(anyhow!("quiz backend is not configured"))
    }

    async fn translate_questions(
        &self,
        _questions: &[Question],
        _target_language: &str,
    ) -> Result<Vec<Question>> {
        Err(anyhow!("quiz backend is not configured"))
    }

    async fn send_email(&self, _request: EmailRequest) -> Result<EmailReceipt> {
        Err(anyhow!("quiz backend is not configured"))
    }
}

pub struct HttpQuizBackend {
    http: Client,
    base_url: String,
}

impl HttpQuizBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: settings.backend_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Surfaces the backend's `{"detail": ...}` body on non-2xx responses.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = match response.json::<BackendDetail>().await {
            Ok(body) => body.detail,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(BackendStatusError::new(status.as_u16(), detail).into())
    }

    fn normalize_questions(wire: Vec<WireQuestion>) -> Result<Vec<Question>> {
        let total = wire.len();
        let questions: Vec<Question> = wire
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| item.into_question(index))
            .collect();
        let skipped = total - questions.len();
        if skipped > 0 {
            warn!(skipped, total, "dropped malformed questions from generation response");
        }
        if questions.is_empty() {
            return Err(anyhow!("generation response contained no usable questions"));
        }
        Ok(questions)
    }
}

#[async_trait]
impl QuizBackend for HttpQuizBackend {
    async fn extract_topics(&self, filename: &str, bytes: Vec<u8>) -> Result<Vec<String>> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);
        let response = self
            .http
            .post(self.endpoint("/extract-topics/"))
            .multipart(form)
            .send()
            .await
            .context("extract-topics request failed")?;
        let body: ExtractTopicsResponse = Self::check(response)
            .await?
            .json()
            .await
            .context("malformed extract-topics response")?;
        Ok(body.topics)
    }

    async fn generate_questions(
        &self,
        topics: &[String],
        difficulty: Difficulty,
        count: u32,
    ) -> Result<Vec<Question>> {
        let form = Form::new()
            .text("topics", serde_json::to_string(topics)?)
            .text("difficulty", difficulty.as_str().to_string())
            .text("num_questions", count.to_string());
        let response = self
            .http
            .post(self.endpoint("/generate-questions/"))
            .multipart(form)
            .send()
            .await
            .context("generate-questions request failed")?;
        let wire: Vec<WireQuestion> = Self::check(response)
            .await?
            .json()
            .await
            .context("malformed generate-questions response")?;
        Self::normalize_questions(wire)
    }

    async fn generate_failed_topic_questions(
        &self,
        topics: &[String],
        per_topic: u32,
    ) -> Result<Vec<Question>> {
        let form = Form::new()
            .text("failed_topics", serde_json::to_string(topics)?)
            .text("num_questions_per_topic", per_topic.to_string());
        let response = self
            .http
            .post(self.endpoint("/generate-failed-topics-questions/"))
            .multipart(form)
            .send()
            .await
            .context("failed-topics generation request failed")?;
        let wire: Vec<WireQuestion> = Self::check(response)
            .await?
            .json()
            .await
            .context("malformed failed-topics generation response")?;
        Self::normalize_questions(wire)
    }

    async fn translate_questions(
        &self,
        questions: &[Question],
        target_language: &str,
    ) -> Result<Vec<Question>> {
        let wire: Vec<WireQuestion> = questions.iter().map(WireQuestion::from_question).collect();
        let form = Form::new()
            .text("questions", serde_json::to_string(&wire)?)
            .text("target_language", target_language.to_string());
        let response = self
            .http
            .post(self.endpoint("/translate-questions/"))
            .multipart(form)
            .send()
            .await
            .context("translate-questions request failed")?;
        let translated: Vec<WireQuestion> = Self::check(response)
            .await?
            .json()
            .await
            .context("malformed translate-questions response")?;
        if translated.len() != questions.len() {
            return Err(anyhow!(
                "translation returned {} questions for {} submitted",
                translated.len(),
                questions.len()
            ));
        }
        // Ids must stay stable across translation; re-attach them by position.
        let mut out = Vec::with_capacity(questions.len());
        for (original, item) in questions.iter().zip(translated) {
            let mut question = item
                .into_question(0)
                .ok_or_else(|| anyhow!("translated question lost its answer key"))?;
            question.id = original.id.clone();
            out.push(question);
        }
        Ok(out)
    }

    async fn send_email(&self, request: EmailRequest) -> Result<EmailReceipt> {
        let mut form = Form::new()
            .text("to", request.to)
            .text("subject", request.subject)
            .text("body", request.body);
        if let Some((filename, bytes)) = request.attachment {
            form = form.part("file", Part::bytes(bytes).file_name(filename));
        }
        let response = self
            .http
            .post(self.endpoint("/send-email"))
            .multipart(form)
            .send()
            .await
            .context("send-email request failed")?;
        let receipt: EmailReceipt = Self::check(response)
            .await?
            .json()
            .await
            .context("malformed send-email response")?;
        Ok(receipt)
    }
}
