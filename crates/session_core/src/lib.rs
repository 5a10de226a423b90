//! Quiz session controller: owns the wizard state machine, mediates the
//! external backend calls, and guarantees the session never stalls on a
//! failed service.

use std::sync::Arc;
use std::time::Instant;

use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::Duration,
};
use tracing::{debug, info, warn};

use shared::domain::{
    Difficulty, Question, QuestionId, RetakeMode, SourceDocument, Stage, GENERAL_TOPIC,
};

pub mod backend;
pub mod config;
pub mod error;
pub mod fallback;
pub mod report;
pub mod session;

pub use backend::{EmailRequest, HttpQuizBackend, MissingQuizBackend, QuizBackend};
pub use config::{load_settings, Settings};
pub use error::SessionError;
pub use session::{merge_topic_selections, QuizSession, TopicStat};

/// Interval on which entry into the test stage re-checks for questions.
const QUESTION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking notices and progress signals for whatever view is attached.
/// Failures here are advisory; the state machine has already degraded safely.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StageChanged(Stage),
    TopicsExtracted { count: usize },
    ExtractionFailed { message: String },
    QuestionsReady { count: usize, fallback: bool },
    GenerationFailed { message: String },
    TranslationFailed { message: String },
    CountdownTick { remaining_seconds: u64 },
    TimeExpired,
    NoFailedTopics,
    EmailSent { to: String },
    EmailFailed { message: String },
}

struct ControllerState {
    session: QuizSession,
    /// Bumped on restart; async results tagged with an older epoch are
    /// dropped at merge time.
    epoch: u64,
    generation_started: bool,
    test_started_at: Option<Instant>,
    countdown_task: Option<JoinHandle<()>>,
}

pub struct QuizController {
    backend: Arc<dyn QuizBackend>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<SessionEvent>,
}

impl QuizController {
    pub fn new(backend: Arc<dyn QuizBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            backend,
            inner: Mutex::new(ControllerState {
                session: QuizSession::default(),
                epoch: 0,
                generation_started: false,
                test_started_at: None,
                countdown_task: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the whole record; consumers never observe partial updates.
    pub async fn session(&self) -> QuizSession {
        self.inner.lock().await.session.clone()
    }

    pub async fn stage(&self) -> Stage {
        self.inner.lock().await.session.stage
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn set_stage_locked(&self, state: &mut ControllerState, next: Stage) {
        debug!(from = %state.session.stage, to = %next, "stage transition");
        state.session.stage = next;
        self.emit(SessionEvent::StageChanged(next));
    }

    /// Pure transition between adjacent stages. Entering the test stage this
    /// way requires questions to already be present; `begin_test` is the path
    /// that waits for them.
    pub async fn set_stage(&self, next: Stage) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        let current = state.session.stage;
        if current.next() != Some(next) && current.back() != Some(next) {
            return Err(SessionError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        if next == Stage::Test && state.session.questions.is_empty() {
            return Err(SessionError::QuestionsNotReady);
        }
        self.set_stage_locked(&mut state, next);
        Ok(())
    }

    /// One stage back, mirroring the forward edge. Cancels the countdown when
    /// leaving the test stage; landing back on the starting stage re-arms the
    /// wait-for-questions flow.
    pub async fn retreat(self: &Arc<Self>) -> Result<Stage, SessionError> {
        let (previous, epoch) = {
            let mut state = self.inner.lock().await;
            let current = state.session.stage;
            let Some(previous) = current.back() else {
                return Err(SessionError::AtFirstStage(current));
            };
            if current == Stage::Test {
                if let Some(task) = state.countdown_task.take() {
                    task.abort();
                }
                state.test_started_at = None;
            }
            self.set_stage_locked(&mut state, previous);
            (previous, state.epoch)
        };
        if previous == Stage::Starting {
            let controller = Arc::clone(self);
            tokio::spawn(async move {
                controller.begin_test_for_epoch(epoch).await;
            });
        }
        Ok(previous)
    }

    /// Stores the document, advances to scanning, and starts extraction in
    /// the background. The scanning stage completes when the result lands,
    /// successful or not.
    pub async fn submit_upload(
        self: &Arc<Self>,
        document: SourceDocument,
    ) -> Result<(), SessionError> {
        let epoch = {
            let mut state = self.inner.lock().await;
            if state.session.stage != Stage::Upload {
                return Err(SessionError::WrongStage {
                    action: "upload a document",
                    stage: state.session.stage,
                });
            }
            state.session.source_document = Some(document.clone());
            self.set_stage_locked(&mut state, Stage::Scanning);
            state.epoch
        };
        info!(filename = %document.filename, "document submitted, extracting topics");
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = controller
                .backend
                .extract_topics(&document.filename, document.bytes)
                .await;
            let topics = match outcome {
                Ok(topics) => topics,
                Err(err) => {
                    warn!("topic extraction failed: {err:#}");
                    controller.emit(SessionEvent::ExtractionFailed {
                        message: err.to_string(),
                    });
                    Vec::new()
                }
            };
            controller.merge_extracted(epoch, topics).await;
        });
        Ok(())
    }

    /// Merges an extraction outcome for the current session. Extraction
    /// failure degrades to an empty topic list; the wizard continues either
    /// way.
    pub async fn complete_scanning(&self, topics: Vec<String>) {
        let epoch = self.inner.lock().await.epoch;
        self.merge_extracted(epoch, topics).await;
    }

    async fn merge_extracted(&self, epoch: u64, topics: Vec<String>) {
        let mut state = self.inner.lock().await;
        if state.epoch != epoch {
            debug!("dropping extraction result from a previous session");
            return;
        }
        // Set once; later merges must never overwrite the original list.
        if state.session.extracted_topics.is_empty() {
            state.session.extracted_topics = topics;
        }
        self.emit(SessionEvent::TopicsExtracted {
            count: state.session.extracted_topics.len(),
        });
        if state.session.stage == Stage::Scanning {
            self.set_stage_locked(&mut state, Stage::Topics);
        }
    }

    /// Canonicalizes and stores the selection; an empty pick refuses to
    /// advance. The extracted list is carried forward untouched.
    pub async fn choose_topics(&self, topics: Vec<String>) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.session.stage != Stage::Topics {
            return Err(SessionError::WrongStage {
                action: "choose topics",
                stage: state.session.stage,
            });
        }
        let merged = merge_topic_selections(&state.session.extracted_topics, &topics);
        if merged.is_empty() {
            return Err(SessionError::EmptyTopicSelection);
        }
        state.session.selected_topics = merged;
        self.set_stage_locked(&mut state, Stage::Difficulty);
        Ok(())
    }

    pub async fn choose_difficulty(&self, difficulty: Difficulty) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.session.stage != Stage::Difficulty {
            return Err(SessionError::WrongStage {
                action: "choose a difficulty",
                stage: state.session.stage,
            });
        }
        state.session.difficulty = difficulty;
        self.set_stage_locked(&mut state, Stage::Count);
        Ok(())
    }

    /// Clamps into the supported range and kicks off generation; by the time
    /// the user finishes the timer and language stages the questions are
    /// usually ready.
    pub async fn choose_count(self: &Arc<Self>, raw: i64) -> Result<(), SessionError> {
        {
            let mut state = self.inner.lock().await;
            if state.session.stage != Stage::Count {
                return Err(SessionError::WrongStage {
                    action: "choose a question count",
                    stage: state.session.stage,
                });
            }
            state.session.question_count = QuizSession::clamp_question_count(raw);
            self.set_stage_locked(&mut state, Stage::Timer);
        }
        self.begin_generation().await;
        Ok(())
    }

    pub async fn choose_timer(&self, raw: i64) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.session.stage != Stage::Timer {
            return Err(SessionError::WrongStage {
                action: "choose a time limit",
                stage: state.session.stage,
            });
        }
        state.session.time_limit_minutes = QuizSession::clamp_time_limit(raw);
        self.set_stage_locked(&mut state, Stage::Language);
        Ok(())
    }

    /// Stores the target language and enters the starting stage, which waits
    /// for questions, translates when needed, and rolls into the test.
    pub async fn choose_language(
        self: &Arc<Self>,
        language: Option<String>,
    ) -> Result<(), SessionError> {
        let epoch = {
            let mut state = self.inner.lock().await;
            if state.session.stage != Stage::Language {
                return Err(SessionError::WrongStage {
                    action: "choose a language",
                    stage: state.session.stage,
                });
            }
            state.session.language = language.filter(|code| !code.trim().is_empty());
            self.set_stage_locked(&mut state, Stage::Starting);
            state.epoch
        };
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.begin_test_for_epoch(epoch).await;
        });
        Ok(())
    }

    /// Requests questions from the backend once per run. On failure the
    /// placeholder set is substituted so the wizard can still proceed.
    pub async fn begin_generation(self: &Arc<Self>) {
        let (epoch, topics, difficulty, count, retake) = {
            let mut state = self.inner.lock().await;
            if state.generation_started || !state.session.questions.is_empty() {
                return;
            }
            if state.session.selected_topics.is_empty() {
                debug!("generation deferred: no topics selected yet");
                return;
            }
            state.generation_started = true;
            (
                state.epoch,
                state.session.selected_topics.clone(),
                state.session.difficulty,
                state.session.question_count,
                state.session.retake,
            )
        };
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let result = match retake {
                Some(RetakeMode::FailedTopics) => {
                    let per_topic = count.div_ceil(topics.len() as u32).max(1);
                    controller
                        .backend
                        .generate_failed_topic_questions(&topics, per_topic)
                        .await
                        .map(|mut questions| {
                            questions.truncate(count as usize);
                            questions
                        })
                }
                _ => {
                    controller
                        .backend
                        .generate_questions(&topics, difficulty, count)
                        .await
                }
            };
            controller.merge_generated(epoch, &topics, count, result).await;
        });
    }

    async fn merge_generated(
        &self,
        epoch: u64,
        topics: &[String],
        count: u32,
        result: anyhow::Result<Vec<Question>>,
    ) {
        let mut state = self.inner.lock().await;
        if state.epoch != epoch {
            debug!("dropping generation result from a previous session");
            return;
        }
        if !state.session.questions.is_empty() {
            debug!("late generation result ignored; questions already present");
            return;
        }
        match result {
            Ok(questions) => {
                info!(count = questions.len(), "questions ready");
                state.session.used_fallback_questions = false;
                self.emit(SessionEvent::QuestionsReady {
                    count: questions.len(),
                    fallback: false,
                });
                state.session.questions = questions;
            }
            Err(err) => {
                warn!("question generation failed, substituting placeholders: {err:#}");
                self.emit(SessionEvent::GenerationFailed {
                    message: err.to_string(),
                });
                let placeholders = fallback::placeholder_questions(topics, count);
                state.session.used_fallback_questions = true;
                self.emit(SessionEvent::QuestionsReady {
                    count: placeholders.len(),
                    fallback: true,
                });
                state.session.questions = placeholders;
            }
        }
    }

    /// Translates the current questions when a non-source language was
    /// chosen. Any failure keeps the originals; translation never blocks
    /// progress.
    pub async fn maybe_translate(&self) {
        let (epoch, questions, language) = {
            let state = self.inner.lock().await;
            if !state.session.wants_translation() || state.session.questions.is_empty() {
                return;
            }
            let language = match &state.session.language {
                Some(code) => code.clone(),
                None => return,
            };
            (state.epoch, state.session.questions.clone(), language)
        };
        match self
            .backend
            .translate_questions(&questions, &language)
            .await
        {
            Ok(translated) => {
                let mut state = self.inner.lock().await;
                if state.epoch != epoch {
                    debug!("dropping translation result from a previous session");
                    return;
                }
                info!(language = %language, "questions translated");
                state.session.questions = translated;
            }
            Err(err) => {
                warn!("translation failed, keeping source-language questions: {err:#}");
                self.emit(SessionEvent::TranslationFailed {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Waits (bounded-interval poll) for questions, translates when needed,
    /// then enters the test stage and arms the countdown. The generation
    /// fallback guarantees the poll terminates.
    pub async fn begin_test(self: &Arc<Self>) {
        let epoch = self.inner.lock().await.epoch;
        self.begin_test_for_epoch(epoch).await;
    }

    async fn begin_test_for_epoch(self: &Arc<Self>, epoch: u64) {
        loop {
            {
                let state = self.inner.lock().await;
                if state.epoch != epoch || state.session.stage != Stage::Starting {
                    return;
                }
                if !state.session.questions.is_empty() {
                    break;
                }
            }
            tokio::time::sleep(QUESTION_POLL_INTERVAL).await;
        }
        self.maybe_translate().await;
        let limit_seconds = {
            let mut state = self.inner.lock().await;
            if state.epoch != epoch || state.session.stage != Stage::Starting {
                return;
            }
            if state.session.questions.is_empty() {
                return;
            }
            state.test_started_at = Some(Instant::now());
            self.set_stage_locked(&mut state, Stage::Test);
            u64::from(state.session.time_limit_minutes) * 60
        };
        if limit_seconds > 0 {
            self.spawn_countdown(epoch, limit_seconds).await;
        }
    }

    async fn spawn_countdown(self: &Arc<Self>, epoch: u64, limit_seconds: u64) {
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut remaining = limit_seconds;
            while remaining > 0 {
                tokio::time::sleep(COUNTDOWN_TICK).await;
                remaining -= 1;
                controller.emit(SessionEvent::CountdownTick {
                    remaining_seconds: remaining,
                });
            }
            controller.emit(SessionEvent::TimeExpired);
            if let Err(err) = controller.finish().await {
                debug!("countdown expiry found the quiz already finished: {err}");
            }
        });
        let mut state = self.inner.lock().await;
        if state.epoch != epoch || state.session.stage != Stage::Test {
            task.abort();
            return;
        }
        if let Some(previous) = state.countdown_task.replace(task) {
            previous.abort();
        }
    }

    /// Records one answer. The id must reference an existing question; the
    /// chosen key is stored as-is and judged at finish time.
    pub async fn record_answer(
        &self,
        question_id: &QuestionId,
        option_key: impl Into<String> + Send,
    ) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.session.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion(question_id.clone()));
        }
        state.session.answers.insert(question_id.clone(), option_key.into());
        Ok(())
    }

    pub async fn toggle_flag(&self, question_id: &QuestionId) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.session.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion(question_id.clone()));
        }
        if !state.session.flagged.remove(question_id) {
            state.session.flagged.insert(question_id.clone());
        }
        Ok(())
    }

    /// Scores the run, freezes the answers, and moves to the results stage.
    /// Also invoked by the countdown when time runs out.
    pub async fn finish(&self) -> Result<(), SessionError> {
        let countdown = {
            let mut state = self.inner.lock().await;
            if state.session.stage != Stage::Test {
                return Err(SessionError::WrongStage {
                    action: "finish the quiz",
                    stage: state.session.stage,
                });
            }
            let score = state.session.compute_score();
            let limit_seconds = u64::from(state.session.time_limit_minutes) * 60;
            let elapsed = state
                .test_started_at
                .take()
                .map(|started| started.elapsed().as_secs())
                .unwrap_or(0);
            let spent = if limit_seconds > 0 {
                elapsed.min(limit_seconds)
            } else {
                elapsed
            };
            state.session.score = Some(score);
            state.session.time_spent_seconds = Some(spent);
            info!(score, total = state.session.questions.len(), "quiz finished");
            self.set_stage_locked(&mut state, Stage::Results);
            state.countdown_task.take()
        };
        if let Some(task) = countdown {
            task.abort();
        }
        Ok(())
    }

    /// Back to topic selection with the topics this run actually used,
    /// skipping upload and extraction.
    pub async fn retake_same_topics(&self) -> Result<(), SessionError> {
        let mut state = self.inner.lock().await;
        if state.session.stage != Stage::Results {
            return Err(SessionError::WrongStage {
                action: "retake the quiz",
                stage: state.session.stage,
            });
        }
        let mut topics = state.session.question_topics();
        // An all-General list means the questions carried no real labels;
        // fall back to what extraction originally found.
        if topics.iter().all(|t| t == GENERAL_TOPIC) && !state.session.extracted_topics.is_empty()
        {
            topics = state.session.extracted_topics.clone();
        }
        state.session.selected_topics = topics;
        state.session.retake = Some(RetakeMode::SameTopics);
        Self::reset_run_fields(&mut state);
        self.set_stage_locked(&mut state, Stage::Topics);
        Ok(())
    }

    /// Back to the difficulty stage with exactly the topics scored below
    /// half. Returns false (and stays on results) when nothing failed.
    pub async fn retake_failed_topics(&self) -> Result<bool, SessionError> {
        let mut state = self.inner.lock().await;
        if state.session.stage != Stage::Results {
            return Err(SessionError::WrongStage {
                action: "retake failed topics",
                stage: state.session.stage,
            });
        }
        let failing = state.session.failing_topics();
        if failing.is_empty() {
            info!("no topic below half accuracy; staying on results");
            self.emit(SessionEvent::NoFailedTopics);
            return Ok(false);
        }
        state.session.selected_topics = failing;
        state.session.retake = Some(RetakeMode::FailedTopics);
        Self::reset_run_fields(&mut state);
        self.set_stage_locked(&mut state, Stage::Difficulty);
        Ok(true)
    }

    fn reset_run_fields(state: &mut ControllerState) {
        state.session.questions.clear();
        state.session.answers.clear();
        state.session.flagged.clear();
        state.session.used_fallback_questions = false;
        state.session.score = None;
        state.session.time_spent_seconds = None;
        state.generation_started = false;
        state.test_started_at = None;
    }

    /// Resets everything to defaults and bumps the epoch, so results of
    /// requests started before the restart are dropped when they land.
    pub async fn restart(&self) {
        let countdown = {
            let mut state = self.inner.lock().await;
            state.epoch += 1;
            state.session = QuizSession::default();
            state.generation_started = false;
            state.test_started_at = None;
            info!(epoch = state.epoch, "session restarted");
            self.emit(SessionEvent::StageChanged(Stage::Upload));
            state.countdown_task.take()
        };
        if let Some(task) = countdown {
            task.abort();
        }
    }

    /// Emails the plain-text report from the results stage. Validation
    /// happens before any work; delivery outcome arrives as a notice.
    pub async fn send_results_email(self: &Arc<Self>, to: &str) -> Result<(), SessionError> {
        if !report::is_plausible_email(to) {
            return Err(SessionError::InvalidEmail(to.to_string()));
        }
        let (subject, body) = {
            let state = self.inner.lock().await;
            if state.session.stage != Stage::Results {
                return Err(SessionError::WrongStage {
                    action: "email the results",
                    stage: state.session.stage,
                });
            }
            (
                report::email_subject(&state.session),
                report::results_report(&state.session),
            )
        };
        let request = EmailRequest {
            to: to.to_string(),
            subject,
            attachment: Some((
                report::REPORT_ATTACHMENT_NAME.to_string(),
                body.clone().into_bytes(),
            )),
            body,
        };
        let controller = Arc::clone(self);
        let to = to.to_string();
        tokio::spawn(async move {
            match controller.backend.send_email(request).await {
                Ok(receipt) if receipt.is_success() => {
                    info!(to = %to, "results emailed");
                    controller.emit(SessionEvent::EmailSent { to });
                }
                Ok(receipt) => {
                    let message = receipt
                        .message
                        .unwrap_or_else(|| "backend rejected the email".to_string());
                    warn!("email delivery rejected: {message}");
                    controller.emit(SessionEvent::EmailFailed { message });
                }
                Err(err) => {
                    warn!("email delivery failed: {err:#}");
                    controller.emit(SessionEvent::EmailFailed {
                        message: err.to_string(),
                    });
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests;
