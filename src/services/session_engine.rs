//! Sequencing of one quiz session: start, presentation, scoring, refills and the end
//! hand-off.
//!
//! The engine is synchronous. Anything that needs I/O (the initial fetch and offline
//! refills) is split into a request the caller executes and a completion it feeds back,
//! tagged with the session id so late results for a dead session are rejected.

use rand::{SeedableRng, rngs::StdRng};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::question_source::{BatchRequest, SourceResult},
    error::SessionError,
    state::{
        quiz::{
            AnswerOutcome, Mode, Question, QuestionView, SessionConfig, SessionState,
            SessionSummary,
        },
        state_machine::{
            EndReason, InvalidTransition, PlanId, QuizEvent, QuizPhase, QuizStateMachine,
            RunningPhase,
        },
    },
};

/// Oversized first batch for offline practice, amortising refills.
pub const OFFLINE_INITIAL_BATCH: u32 = 20;
/// Batch appended whenever offline practice runs out of questions.
pub const OFFLINE_REFILL_BATCH: u32 = 10;

/// Who triggered a submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// The player pressed submit.
    User,
    /// The countdown reached zero.
    Timeout,
}

/// Fetch the caller must run before the session can start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTicket {
    /// Id the new session will carry; pass it back to [`SessionEngine::finish_start`].
    pub session_id: Uuid,
    /// Mode selecting the question source.
    pub mode: Mode,
    /// What to fetch.
    pub request: BatchRequest,
}

/// What happens after a question is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The next question is ready.
    Next(QuestionView),
    /// Offline practice ran dry; fetch `request` and call [`SessionEngine::accept_refill`].
    NeedsRefill {
        /// Session the refill belongs to.
        session_id: Uuid,
        /// Batch to fetch.
        request: BatchRequest,
    },
    /// The online session presented its last question.
    Finished(SessionSummary),
}

/// Result of one countdown tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// No countdown is armed for the current phase.
    Idle,
    /// Seconds left after this tick.
    Remaining(u32),
    /// The countdown hit zero and the question was scored as timed out.
    Expired(Advance),
}

#[derive(Debug)]
struct PendingStart {
    plan_id: PlanId,
    session_id: Uuid,
    config: SessionConfig,
}

/// Owner of the in-progress [`SessionState`].
pub struct SessionEngine {
    machine: QuizStateMachine,
    session: Option<SessionState>,
    pending_start: Option<PendingStart>,
    summary: Option<SessionSummary>,
    rng: StdRng,
}

impl Default for SessionEngine {
    fn default() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
}

impl SessionEngine {
    /// Engine in the setup phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine using a caller-provided generator for option shuffling.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            machine: QuizStateMachine::new(),
            session: None,
            pending_start: None,
            summary: None,
            rng,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> QuizPhase {
        self.machine.phase()
    }

    /// Session being played, if any.
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Summary of the last finished session, kept until [`SessionEngine::reset`].
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    /// Whether a start fetch is in flight.
    pub fn is_starting(&self) -> bool {
        self.pending_start.is_some()
    }

    /// Validate `config` and plan the start transition. The returned ticket describes the
    /// initial fetch.
    pub fn begin_start(&mut self, config: SessionConfig) -> Result<StartTicket, SessionError> {
        config.validate()?;
        let plan = self.machine.plan(QuizEvent::Start)?;

        let count = match config.mode {
            Mode::Online => config.num_questions,
            Mode::Offline => OFFLINE_INITIAL_BATCH,
        };
        let ticket = StartTicket {
            session_id: Uuid::new_v4(),
            mode: config.mode,
            request: batch_request(&config, count),
        };
        self.pending_start = Some(PendingStart {
            plan_id: plan.id,
            session_id: ticket.session_id,
            config,
        });
        Ok(ticket)
    }

    /// Complete a start with the fetch result. On failure the engine stays in setup.
    pub fn finish_start(
        &mut self,
        session_id: Uuid,
        fetched: SourceResult<Vec<Question>>,
    ) -> Result<QuestionView, SessionError> {
        let pending = match self.pending_start.take() {
            Some(pending) if pending.session_id == session_id => pending,
            other => {
                self.pending_start = other;
                return Err(SessionError::Stale);
            }
        };

        let questions = match fetched {
            Ok(questions) if !questions.is_empty() => questions,
            Ok(_) => {
                self.abort_start(pending.plan_id);
                return Err(SessionError::SourceExhausted);
            }
            Err(err) => {
                self.abort_start(pending.plan_id);
                return Err(err.into());
            }
        };

        // The engine is the only writer, so a failed apply means the plan was superseded.
        self.machine
            .apply(pending.plan_id)
            .map_err(|_| SessionError::Stale)?;

        let mut session = SessionState::new(pending.config, questions);
        session.id = pending.session_id;
        session.remaining_seconds = session.config.time_limit_secs();
        self.session = Some(session);
        self.summary = None;
        self.present()
    }

    /// Drop an in-flight start; its result will be rejected as stale.
    pub fn cancel_start(&mut self) -> bool {
        match self.pending_start.take() {
            Some(pending) => {
                self.abort_start(pending.plan_id);
                true
            }
            None => false,
        }
    }

    fn abort_start(&mut self, plan_id: PlanId) {
        // Only fails when no plan is pending, which leaves nothing to undo.
        let _ = self.machine.abort(plan_id);
    }

    /// Current question with a freshly shuffled option order.
    pub fn present(&mut self) -> Result<QuestionView, SessionError> {
        let Self { session, rng, .. } = self;
        let session = session.as_ref().ok_or(SessionError::NotRunning)?;
        let question = session.current().ok_or(SessionError::NotRunning)?;

        Ok(QuestionView {
            index: session.index,
            total: match session.config.mode {
                Mode::Online => Some(session.questions.len()),
                Mode::Offline => None,
            },
            text: question.text().to_string(),
            options: question.shuffled_options(rng),
            time_limit_secs: session.config.time_limit_secs(),
        })
    }

    /// Score the current question. A missing selection is only accepted from a timeout.
    pub fn submit(
        &mut self,
        selection: Option<&str>,
        trigger: SubmitTrigger,
    ) -> Result<Advance, SessionError> {
        let question = self.answering()?;
        let outcome = match (trigger, selection) {
            (SubmitTrigger::Timeout, _) => AnswerOutcome::TimedOut,
            (SubmitTrigger::User, None) => return Err(SessionError::SelectionRequired),
            (SubmitTrigger::User, Some(answer)) if question.is_correct(answer) => {
                AnswerOutcome::Correct
            }
            (SubmitTrigger::User, Some(_)) => AnswerOutcome::Wrong,
        };
        self.resolve(outcome)
    }

    /// Move past the current question without a point.
    pub fn skip(&mut self) -> Result<Advance, SessionError> {
        self.answering()?;
        self.resolve(AnswerOutcome::Skipped)
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> Result<Tick, SessionError> {
        if self.machine.phase() != QuizPhase::Running(RunningPhase::Answering) {
            return Ok(Tick::Idle);
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(Tick::Idle);
        };
        let Some(remaining) = session.remaining_seconds else {
            return Ok(Tick::Idle);
        };

        let remaining = remaining.saturating_sub(1);
        session.remaining_seconds = Some(remaining);
        if remaining > 0 {
            return Ok(Tick::Remaining(remaining));
        }
        let advance = self.submit(None, SubmitTrigger::Timeout)?;
        Ok(Tick::Expired(advance))
    }

    /// Append a refill batch to an offline session waiting for one.
    pub fn accept_refill(
        &mut self,
        session_id: Uuid,
        fetched: SourceResult<Vec<Question>>,
    ) -> Result<QuestionView, SessionError> {
        let waiting = self.machine.phase() == QuizPhase::Running(RunningPhase::Refilling);
        let session = match self.session.as_mut() {
            Some(session) if waiting && session.id == session_id => session,
            _ => return Err(SessionError::Stale),
        };

        let batch = match fetched {
            Ok(batch) if !batch.is_empty() => batch,
            Ok(_) => return Err(SessionError::SourceExhausted),
            Err(err) => return Err(err.into()),
        };
        session.questions.extend(batch);
        session.remaining_seconds = session.config.time_limit_secs();

        self.machine.fire(QuizEvent::Refilled)?;
        self.present()
    }

    /// Refill request for an offline session stuck in the refill phase.
    pub fn refill_request(&self) -> Option<(Uuid, BatchRequest)> {
        if self.machine.phase() != QuizPhase::Running(RunningPhase::Refilling) {
            return None;
        }
        self.session.as_ref().map(|session| {
            (
                session.id,
                batch_request(&session.config, OFFLINE_REFILL_BATCH),
            )
        })
    }

    /// End the session from any running sub-phase. Returns `None` when already ended or
    /// when only a pending start was cancelled.
    pub fn end(&mut self) -> Result<Option<SessionSummary>, SessionError> {
        match self.machine.phase() {
            QuizPhase::Ended => Ok(None),
            QuizPhase::Setup if self.cancel_start() => Ok(None),
            QuizPhase::Setup => Err(SessionError::NotRunning),
            QuizPhase::Running(_) => {
                self.machine.fire(QuizEvent::End(EndReason::UserEnded))?;
                Ok(self.finish())
            }
        }
    }

    /// Leave the results screen and return to setup.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        match self.machine.phase() {
            QuizPhase::Setup => Ok(()),
            _ => {
                self.machine.fire(QuizEvent::Reset)?;
                self.summary = None;
                Ok(())
            }
        }
    }

    fn answering(&self) -> Result<&Question, SessionError> {
        let phase = self.machine.phase();
        if phase != QuizPhase::Running(RunningPhase::Answering) {
            return Err(SessionError::InvalidTransition(InvalidTransition {
                from: phase,
                event: QuizEvent::Resolve(AnswerOutcome::Skipped),
            }));
        }
        self.session
            .as_ref()
            .and_then(SessionState::current)
            .ok_or(SessionError::NotRunning)
    }

    fn resolve(&mut self, outcome: AnswerOutcome) -> Result<Advance, SessionError> {
        self.machine.fire(QuizEvent::Resolve(outcome))?;
        let session = self.session.as_mut().ok_or(SessionError::NotRunning)?;
        session.resolve(outcome);

        if !session.is_exhausted() {
            session.remaining_seconds = session.config.time_limit_secs();
            self.machine.fire(QuizEvent::NextQuestion)?;
            return self.present().map(Advance::Next);
        }

        match session.config.mode {
            Mode::Online => {
                self.machine.fire(QuizEvent::End(EndReason::Exhausted))?;
                self.finish()
                    .map(Advance::Finished)
                    .ok_or(SessionError::NotRunning)
            }
            Mode::Offline => {
                let session_id = session.id;
                let request = batch_request(&session.config, OFFLINE_REFILL_BATCH);
                self.machine.fire(QuizEvent::AwaitRefill)?;
                Ok(Advance::NeedsRefill {
                    session_id,
                    request,
                })
            }
        }
    }

    fn finish(&mut self) -> Option<SessionSummary> {
        let session = self.session.take()?;
        let summary = SessionSummary {
            total: u32::try_from(session.index).unwrap_or(u32::MAX),
            score: session.score,
            outcomes: session.outcomes,
            config: session.config,
        };
        self.summary = Some(summary.clone());
        Some(summary)
    }
}

fn batch_request(config: &SessionConfig, count: u32) -> BatchRequest {
    BatchRequest {
        category: config.category.clone(),
        difficulty: (config.mode == Mode::Online).then_some(config.difficulty),
        count,
    }
}
