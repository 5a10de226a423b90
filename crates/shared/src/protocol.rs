use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Question, QuestionId, GENERAL_TOPIC};

/// Response of `POST /extract-topics/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractTopicsResponse {
    pub topics: Vec<String>,
}

/// The generation service labels questions with either a single topic string
/// or a list; older payloads omit the field entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTopics {
    Many(Vec<String>),
    One(String),
    #[default]
    Missing,
}

impl WireTopics {
    pub fn primary(&self) -> Option<&str> {
        match self {
            WireTopics::Many(topics) => topics.iter().map(String::as_str).find(|t| !t.is_empty()),
            WireTopics::One(topic) if !topic.is_empty() => Some(topic),
            _ => None,
        }
    }
}

/// One question as the generation and translation services exchange it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireQuestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub question: String,
    pub options: BTreeMap<String, String>,
    pub correct_answer: String,
    #[serde(default, alias = "topic")]
    pub topics: WireTopics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl WireQuestion {
    /// Normalizes into the canonical letter-keyed shape. `index` is the
    /// question's position in the payload, used for id assignment when the
    /// service did not send one. Returns `None` when the answer key does not
    /// reference an option, which makes the item unusable.
    pub fn into_question(self, index: usize) -> Option<Question> {
        let correct_option = self.correct_answer.trim().to_string();
        if self.options.is_empty() || !self.options.contains_key(&correct_option) {
            return None;
        }
        let topic = self
            .topics
            .primary()
            .unwrap_or(GENERAL_TOPIC)
            .to_string();
        Some(Question {
            id: self
                .id
                .map(QuestionId)
                .unwrap_or_else(|| QuestionId::generated(index)),
            prompt: self.question,
            options: self.options,
            correct_option,
            topic,
            explanation: self.explanation,
        })
    }

    pub fn from_question(question: &Question) -> Self {
        Self {
            id: Some(question.id.0.clone()),
            question: question.prompt.clone(),
            options: question.options.clone(),
            correct_answer: question.correct_option.clone(),
            topics: WireTopics::Many(vec![question.topic.clone()]),
            explanation: question.explanation.clone(),
        }
    }
}

/// Response of `POST /send-email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EmailReceipt {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
