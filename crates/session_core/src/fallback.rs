//! Deterministic placeholder questions for when the generation service is
//! unreachable. The wizard proceeds on these instead of stalling.

use std::collections::BTreeMap;

use shared::domain::{Question, QuestionId, GENERAL_TOPIC};

pub const PLACEHOLDER_ID_PREFIX: &str = "placeholder-";

/// Synthesizes `count` questions cycling through `topics`. Ids carry the
/// placeholder prefix and the prompts state their origin, so a degraded run
/// is never mistaken for real content.
pub fn placeholder_questions(topics: &[String], count: u32) -> Vec<Question> {
    (0..count as usize)
        .map(|index| {
            let topic = if topics.is_empty() {
                GENERAL_TOPIC.to_string()
            } else {
                topics[index % topics.len()].clone()
            };
            let options = BTreeMap::from([
                ("A".to_string(), format!("A core concept of {topic}")),
                ("B".to_string(), format!("A distractor about {topic}")),
                ("C".to_string(), format!("An unrelated statement on {topic}")),
                ("D".to_string(), format!("A partially true claim on {topic}")),
            ]);
            Question {
                id: QuestionId(format!("{PLACEHOLDER_ID_PREFIX}{}", index + 1)),
                prompt: format!(
                    "Placeholder question {} on {topic} (the question service was unavailable)",
                    index + 1
                ),
                options,
                correct_option: "A".to_string(),
                topic,
                explanation: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_the_requested_count_and_cycles_topics() {
        let topics = vec!["Graphs".to_string(), "DP".to_string()];
        let questions = placeholder_questions(&topics, 5);
        assert_eq!(questions.len(), 5);
        assert_eq!(questions[0].topic, "Graphs");
        assert_eq!(questions[1].topic, "DP");
        assert_eq!(questions[4].topic, "Graphs");
        assert_eq!(questions[2].id.as_str(), "placeholder-3");
    }

    #[test]
    fn falls_back_to_the_general_bucket_without_topics() {
        let questions = placeholder_questions(&[], 5);
        assert!(questions.iter().all(|q| q.topic == GENERAL_TOPIC));
        assert!(questions.iter().all(|q| q.options.contains_key(&q.correct_option)));
    }
}
