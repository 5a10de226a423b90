use shared::domain::{QuestionId, Stage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("at least one topic must be selected")]
    EmptyTopicSelection,
    #[error("unknown question id {0}")]
    UnknownQuestion(QuestionId),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("cannot {action} while in the {stage} stage")]
    WrongStage {
        action: &'static str,
        stage: Stage,
    },
    #[error("no transition from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },
    #[error("nothing to retreat to from the {0} stage")]
    AtFirstStage(Stage),
    #[error("questions are not ready yet")]
    QuestionsNotReady,
}
