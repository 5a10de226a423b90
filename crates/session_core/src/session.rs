//! The single in-memory record accumulating one quiz attempt.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use shared::domain::{
    Difficulty, Question, QuestionId, RetakeMode, SourceDocument, Stage,
    DEFAULT_QUESTION_COUNT, DEFAULT_TIME_LIMIT_MINUTES, GENERAL_TOPIC, MAX_QUESTION_COUNT,
    MAX_TIME_LIMIT_MINUTES, MIN_QUESTION_COUNT, SOURCE_LANGUAGE,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSession {
    pub stage: Stage,
    pub source_document: Option<SourceDocument>,
    /// Topics the extraction service detected. Set once, then carried
    /// verbatim through every later transition; the retake shortcuts rely on
    /// it surviving to the results stage.
    pub extracted_topics: Vec<String>,
    /// The user's chosen subset plus custom additions, insertion order kept.
    pub selected_topics: Vec<String>,
    pub difficulty: Difficulty,
    pub question_count: u32,
    /// Minutes; 0 means unlimited.
    pub time_limit_minutes: u32,
    /// Target language code; `None` keeps the source language.
    pub language: Option<String>,
    pub questions: Vec<Question>,
    /// Question id to chosen option key. Absent id counts as unanswered.
    pub answers: HashMap<QuestionId, String>,
    pub flagged: HashSet<QuestionId>,
    /// True when the placeholder set was substituted for a failed generation
    /// call; keeps the degraded path distinguishable from real content.
    pub used_fallback_questions: bool,
    pub retake: Option<RetakeMode>,
    pub score: Option<u32>,
    pub time_spent_seconds: Option<u64>,
}

impl Default for QuizSession {
    fn default() -> Self {
        Self {
            stage: Stage::Upload,
            source_document: None,
            extracted_topics: Vec::new(),
            selected_topics: Vec::new(),
            difficulty: Difficulty::default(),
            question_count: DEFAULT_QUESTION_COUNT,
            time_limit_minutes: DEFAULT_TIME_LIMIT_MINUTES,
            language: None,
            questions: Vec::new(),
            answers: HashMap::new(),
            flagged: HashSet::new(),
            used_fallback_questions: false,
            retake: None,
            score: None,
            time_spent_seconds: None,
        }
    }
}

/// Accuracy of one topic over the completed questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicStat {
    pub topic: String,
    pub correct: u32,
    pub total: u32,
    /// Rounded for display; failing is decided on the exact fraction.
    pub percent: u32,
}

impl TopicStat {
    pub fn is_failing(&self) -> bool {
        self.correct * 2 < self.total
    }
}

impl QuizSession {
    pub fn clamp_question_count(raw: i64) -> u32 {
        raw.clamp(MIN_QUESTION_COUNT as i64, MAX_QUESTION_COUNT as i64) as u32
    }

    pub fn clamp_time_limit(raw: i64) -> u32 {
        raw.clamp(0, MAX_TIME_LIMIT_MINUTES as i64) as u32
    }

    /// Translation runs only when a language was chosen and it differs from
    /// the source language.
    pub fn wants_translation(&self) -> bool {
        matches!(&self.language, Some(code) if !code.is_empty() && code != SOURCE_LANGUAGE)
    }

    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    pub fn compute_score(&self) -> u32 {
        self.questions
            .iter()
            .filter(|q| self.answers.get(&q.id) == Some(&q.correct_option))
            .count() as u32
    }

    /// Per-topic accuracy over `questions`/`answers`, ordered by descending
    /// percent then topic name so the display is reproducible.
    pub fn topic_breakdown(&self) -> Vec<TopicStat> {
        let mut grouped: HashMap<&str, (u32, u32)> = HashMap::new();
        for question in &self.questions {
            let topic = if question.topic.is_empty() {
                GENERAL_TOPIC
            } else {
                question.topic.as_str()
            };
            let entry = grouped.entry(topic).or_default();
            entry.1 += 1;
            if self.answers.get(&question.id) == Some(&question.correct_option) {
                entry.0 += 1;
            }
        }
        let mut stats: Vec<TopicStat> = grouped
            .into_iter()
            .map(|(topic, (correct, total))| TopicStat {
                topic: topic.to_string(),
                correct,
                total,
                percent: round_percent(correct, total),
            })
            .collect();
        stats.sort_by(|a, b| b.percent.cmp(&a.percent).then_with(|| a.topic.cmp(&b.topic)));
        stats
    }

    /// Topics whose accuracy is strictly below one half.
    pub fn failing_topics(&self) -> Vec<String> {
        self.topic_breakdown()
            .into_iter()
            .filter(TopicStat::is_failing)
            .map(|stat| stat.topic)
            .collect()
    }

    /// Unique topics of the current questions, in first-seen order.
    pub fn question_topics(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.questions
            .iter()
            .filter(|q| seen.insert(q.topic.clone()))
            .map(|q| q.topic.clone())
            .collect()
    }
}

fn round_percent(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (correct * 200 + total) / (total * 2)
}

/// Canonicalizes the user's topic picks against the extracted list:
/// case-insensitive de-duplication in insertion order, with the extracted
/// spelling winning when a custom entry collides with a detected topic.
pub fn merge_topic_selections(extracted: &[String], chosen: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(chosen.len());
    for topic in chosen {
        let topic = topic.trim();
        if topic.is_empty() {
            continue;
        }
        let canonical = extracted
            .iter()
            .find(|t| t.eq_ignore_ascii_case(topic))
            .map(String::as_str)
            .unwrap_or(topic);
        if !merged.iter().any(|t| t.eq_ignore_ascii_case(canonical)) {
            merged.push(canonical.to_string());
        }
    }
    merged
}
