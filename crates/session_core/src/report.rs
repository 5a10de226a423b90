//! Plain-text results report used by the results view and as the email
//! body/attachment.

use chrono::Utc;
use shared::domain::GENERAL_TOPIC;

use crate::session::QuizSession;

pub const REPORT_ATTACHMENT_NAME: &str = "quiz-report.txt";

pub fn grade_message(percent: u32) -> &'static str {
    match percent {
        90..=u32::MAX => "Exceptional work!",
        80..=89 => "Excellent job!",
        70..=79 => "Good effort!",
        60..=69 => "Fair attempt.",
        _ => "Keep practicing.",
    }
}

pub fn format_duration(seconds: u64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// Shape check matching the results view: one `@`, a non-empty local part,
/// a dot somewhere inside the domain, no whitespace anywhere.
pub fn is_plausible_email(address: &str) -> bool {
    let mut parts = address.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return false;
    }
    if domain.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn email_subject(session: &QuizSession) -> String {
    format!(
        "Your quiz results: {}/{}",
        session.score.unwrap_or(0),
        session.questions.len()
    )
}

pub fn results_report(session: &QuizSession) -> String {
    let total = session.questions.len() as u32;
    let score = session.score.unwrap_or(0);
    let percent = if total > 0 { score * 100 / total } else { 0 };

    let mut out = String::new();
    out.push_str(&format!(
        "Quiz results — {}\n",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    ));
    out.push_str(&format!(
        "Score: {score}/{total} ({percent}%) — {}\n",
        grade_message(percent)
    ));
    out.push_str(&format!(
        "Time: {}\n",
        session
            .time_spent_seconds
            .map(format_duration)
            .unwrap_or_else(|| "untracked".to_string())
    ));
    out.push_str(&format!("Difficulty: {}\n", session.difficulty));
    if session.used_fallback_questions {
        out.push_str("Note: placeholder questions were used; the question service was unavailable.\n");
    }

    out.push_str("\nTopic breakdown:\n");
    for stat in session.topic_breakdown() {
        out.push_str(&format!(
            "  {}: {}/{} ({}%)\n",
            stat.topic, stat.correct, stat.total, stat.percent
        ));
    }

    out.push_str("\nQuestions:\n");
    for (index, question) in session.questions.iter().enumerate() {
        let chosen = session.answers.get(&question.id);
        let verdict = match chosen {
            Some(key) if *key == question.correct_option => "correct",
            Some(_) => "incorrect",
            None => "unanswered",
        };
        out.push_str(&format!("  {}. {} [{verdict}]\n", index + 1, question.prompt));
        out.push_str(&format!(
            "     Your answer: {} — correct answer: {}\n",
            chosen.map(String::as_str).unwrap_or("-"),
            question.correct_option
        ));
        let explanation = question
            .explanation
            .clone()
            .unwrap_or_else(|| default_explanation(question));
        out.push_str(&format!("     {explanation}\n"));
    }
    out
}

fn default_explanation(question: &shared::domain::Question) -> String {
    let topic = if question.topic.is_empty() {
        GENERAL_TOPIC
    } else {
        question.topic.as_str()
    };
    let correct_text = question
        .options
        .get(&question.correct_option)
        .map(String::as_str)
        .unwrap_or("the correct option");
    format!(
        "The correct choice reflects key principles of {topic}: \"{correct_text}\" best matches what was asked."
    )
}
