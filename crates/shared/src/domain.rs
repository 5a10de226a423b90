use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIN_QUESTION_COUNT: u32 = 5;
pub const MAX_QUESTION_COUNT: u32 = 50;
pub const DEFAULT_QUESTION_COUNT: u32 = 10;
pub const MAX_TIME_LIMIT_MINUTES: u32 = 240;
pub const DEFAULT_TIME_LIMIT_MINUTES: u32 = 30;
/// Language of the source document; questions arrive in it and are only
/// translated away from it.
pub const SOURCE_LANGUAGE: &str = "en";
/// Bucket for questions the generation service returned without a topic label.
pub const GENERAL_TOPIC: &str = "General";

/// One step of the quiz wizard. Exactly one stage is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Scanning,
    Topics,
    Difficulty,
    Count,
    Timer,
    Language,
    Starting,
    Test,
    Results,
}

impl Stage {
    /// Forward order of the wizard. Retreat edges mirror these, one stage per
    /// back action.
    pub const ORDER: [Stage; 10] = [
        Stage::Upload,
        Stage::Scanning,
        Stage::Topics,
        Stage::Difficulty,
        Stage::Count,
        Stage::Timer,
        Stage::Language,
        Stage::Starting,
        Stage::Test,
        Stage::Results,
    ];

    pub fn next(self) -> Option<Stage> {
        let idx = Self::ORDER.iter().position(|s| *s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    pub fn back(self) -> Option<Stage> {
        let idx = Self::ORDER.iter().position(|s| *s == self)?;
        idx.checked_sub(1).map(|prev| Self::ORDER[prev])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Scanning => "scanning",
            Stage::Topics => "topics",
            Stage::Difficulty => "difficulty",
            Stage::Count => "count",
            Stage::Timer => "timer",
            Stage::Language => "language",
            Stage::Starting => "starting",
            Stage::Test => "test",
            Stage::Results => "results",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one question, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionId(pub String);

impl QuestionId {
    /// Id assigned at the generation boundary when the service did not
    /// provide one: `q1`, `q2`, ... by position.
    pub fn generated(index: usize) -> Self {
        Self(format!("q{}", index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One multiple-choice question in its canonical letter-keyed shape.
/// Immutable once generated; translation replaces the whole sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    /// Option key ("A".."D") to option text. BTreeMap keeps display order.
    pub options: BTreeMap<String, String>,
    pub correct_option: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Document uploaded at the start of the wizard, held for topic extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// How the current run was started from a previous run's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetakeMode {
    SameTopics,
    FailedTopics,
}
