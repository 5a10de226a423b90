use shared::domain::QuestionId;

use crate::session::{merge_topic_selections, QuizSession};
use crate::tests::support::{question, questions_for_topic};

#[test]
fn clamps_count_and_time_limit_into_their_ranges() {
    assert_eq!(QuizSession::clamp_question_count(999), 50);
    assert_eq!(QuizSession::clamp_question_count(50), 50);
    assert_eq!(QuizSession::clamp_question_count(5), 5);
    assert_eq!(QuizSession::clamp_question_count(4), 5);
    assert_eq!(QuizSession::clamp_question_count(-7), 5);

    assert_eq!(QuizSession::clamp_time_limit(-1), 0);
    assert_eq!(QuizSession::clamp_time_limit(0), 0);
    assert_eq!(QuizSession::clamp_time_limit(30), 30);
    assert_eq!(QuizSession::clamp_time_limit(500), 240);
}

#[test]
fn translation_is_wanted_only_away_from_the_source_language() {
    let mut session = QuizSession::default();
    assert!(!session.wants_translation());
    session.language = Some("en".to_string());
    assert!(!session.wants_translation());
    session.language = Some("fr".to_string());
    assert!(session.wants_translation());
}

#[test]
fn breakdown_orders_by_percent_then_name_and_buckets_general() {
    let mut session = QuizSession::default();
    session.questions = vec![
        question("q1", "Graphs"),
        question("q2", "Graphs"),
        question("q3", "DP"),
        question("q4", "General"),
    ];
    // Graphs 2/2, DP 1/1, General 0/1.
    for id in ["q1", "q2", "q3"] {
        session
            .answers
            .insert(QuestionId(id.to_string()), "A".to_string());
    }

    let stats = session.topic_breakdown();
    let summary: Vec<(&str, u32)> = stats
        .iter()
        .map(|s| (s.topic.as_str(), s.percent))
        .collect();
    // Equal percentages tie-break alphabetically.
    assert_eq!(summary, vec![("DP", 100), ("Graphs", 100), ("General", 0)]);
}

#[test]
fn failing_is_decided_on_the_exact_fraction() {
    let mut session = QuizSession::default();
    session.questions = vec![
        question("q1", "Graphs"),
        question("q2", "Graphs"),
        question("q3", "DP"),
        question("q4", "DP"),
        question("q5", "DP"),
    ];
    // Graphs 1/2 = exactly half, DP 1/3 = below half.
    session
        .answers
        .insert(QuestionId("q1".to_string()), "A".to_string());
    session
        .answers
        .insert(QuestionId("q3".to_string()), "A".to_string());

    assert_eq!(session.failing_topics(), vec!["DP"]);
}

#[test]
fn percent_rounds_half_up() {
    let mut session = QuizSession::default();
    session.questions = questions_for_topic("Graphs", 3);
    session
        .answers
        .insert(QuestionId("q1".to_string()), "A".to_string());
    assert_eq!(session.topic_breakdown()[0].percent, 33);

    session
        .answers
        .insert(QuestionId("q2".to_string()), "A".to_string());
    assert_eq!(session.topic_breakdown()[0].percent, 67);
}

#[test]
fn score_counts_exact_matches_only() {
    let mut session = QuizSession::default();
    session.questions = questions_for_topic("Graphs", 3);
    session
        .answers
        .insert(QuestionId("q1".to_string()), "A".to_string());
    session
        .answers
        .insert(QuestionId("q2".to_string()), "B".to_string());
    assert_eq!(session.compute_score(), 1);
}

#[test]
fn question_topics_are_unique_in_first_seen_order() {
    let mut session = QuizSession::default();
    session.questions = vec![
        question("q1", "Graphs"),
        question("q2", "DP"),
        question("q3", "Graphs"),
    ];
    assert_eq!(session.question_topics(), vec!["Graphs", "DP"]);
}

#[test]
fn topic_merge_is_case_insensitive_with_extracted_spelling_winning() {
    let extracted = vec!["Data Structures".to_string(), "Graphs".to_string()];
    let chosen = vec![
        "graphs".to_string(),
        "Dynamic Programming".to_string(),
        "GRAPHS".to_string(),
        "  ".to_string(),
        "dynamic programming".to_string(),
    ];
    assert_eq!(
        merge_topic_selections(&extracted, &chosen),
        vec!["Graphs", "Dynamic Programming"]
    );
}
