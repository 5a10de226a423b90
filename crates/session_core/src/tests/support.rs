use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{Difficulty, Question, QuestionId, Stage};
use shared::protocol::EmailReceipt;
use tokio::sync::Mutex;

use crate::backend::{EmailRequest, QuizBackend};
use crate::QuizController;

pub fn question(id: &str, topic: &str) -> Question {
    Question {
        id: QuestionId(id.to_string()),
        prompt: format!("What defines {topic}? ({id})"),
        options: BTreeMap::from([
            ("A".to_string(), format!("The {topic} property")),
            ("B".to_string(), format!("An unrelated {topic} claim")),
            ("C".to_string(), "Neither".to_string()),
            ("D".to_string(), "Both".to_string()),
        ]),
        correct_option: "A".to_string(),
        topic: topic.to_string(),
        explanation: None,
    }
}

pub fn questions_for_topic(topic: &str, count: usize) -> Vec<Question> {
    (0..count)
        .map(|i| question(&format!("q{}", i + 1), topic))
        .collect()
}

/// Scripted backend in the spirit of the real one: canned payloads, per-call
/// failure switches, and recorded requests for assertions.
#[derive(Default)]
pub struct FakeBackend {
    pub topics: Vec<String>,
    pub questions: Vec<Question>,
    pub translated: Option<Vec<Question>>,
    pub fail_extract: bool,
    pub fail_generate: bool,
    pub fail_translate: bool,
    pub fail_email: bool,
    pub extract_delay: Option<Duration>,
    pub generate_calls: Mutex<u32>,
    pub failed_topic_calls: Mutex<Vec<(Vec<String>, u32)>>,
    pub email_requests: Mutex<Vec<EmailRequest>>,
}

impl FakeBackend {
    pub fn ok(topics: Vec<&str>, questions: Vec<Question>) -> Self {
        Self {
            topics: topics.into_iter().map(str::to_string).collect(),
            questions,
            ..Self::default()
        }
    }

    pub fn failing_generation(topics: Vec<&str>) -> Self {
        Self {
            fail_generate: true,
            ..Self::ok(topics, Vec::new())
        }
    }

    pub fn with_translated(mut self, translated: Vec<Question>) -> Self {
        self.translated = Some(translated);
        self
    }

    pub fn with_failing_translation(mut self) -> Self {
        self.fail_translate = true;
        self
    }

    pub fn with_extract_delay(mut self, delay: Duration) -> Self {
        self.extract_delay = Some(delay);
        self
    }
}

#[async_trait]
impl QuizBackend for FakeBackend {
    async fn extract_topics(&self, _filename: &str, _bytes: Vec<u8>) -> Result<Vec<String>> {
        if let Some(delay) = self.extract_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_extract {
            return Err(anyhow!("extraction unavailable"));
        }
        Ok(self.topics.clone())
    }

    async fn generate_questions(
        &self,
        _topics: &[String],
        _difficulty: Difficulty,
        _count: u32,
    ) -> Result<Vec<Question>> {
        *self.generate_calls.lock().await += 1;
        if self.fail_generate {
            return Err(anyhow!("generation unavailable"));
        }
        Ok(self.questions.clone())
    }

    async fn generate_failed_topic_questions(
        &self,
        topics: &[String],
        per_topic: u32,
    ) -> Result<Vec<Question>> {
        self.failed_topic_calls
            .lock()
            .await
            .push((topics.to_vec(), per_topic));
        if self.fail_generate {
            return Err(anyhow!("generation unavailable"));
        }
        Ok(self.questions.clone())
    }

    async fn translate_questions(
        &self,
        questions: &[Question],
        _target_language: &str,
    ) -> Result<Vec<Question>> {
        if self.fail_translate {
            return Err(anyhow!("translation unavailable"));
        }
        Ok(self
            .translated
            .clone()
            .unwrap_or_else(|| questions.to_vec()))
    }

    async fn send_email(&self, request: EmailRequest) -> Result<EmailReceipt> {
        if self.fail_email {
            return Err(anyhow!("email unavailable"));
        }
        self.email_requests.lock().await.push(request);
        Ok(EmailReceipt {
            status: "success".to_string(),
            message: None,
        })
    }
}

pub async fn wait_for_stage(controller: &Arc<QuizController>, stage: Stage) {
    for _ in 0..500 {
        if controller.stage().await == stage {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for the {stage} stage (currently {})",
        controller.stage().await
    );
}
