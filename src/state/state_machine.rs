use thiserror::Error;
use uuid::Uuid;

use crate::state::quiz::AnswerOutcome;

/// High-level phases a quiz session can be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizPhase {
    /// Settings are being chosen; no session exists yet.
    Setup,
    /// A session is active and in one of the per-question sub-phases.
    Running(RunningPhase),
    /// The session is over and its result has been handed off.
    Ended,
}

/// Per-question sub-phase while a session is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunningPhase {
    /// The current question is displayed and accepts a submit or skip.
    Answering,
    /// The current question was just resolved; the engine decides what comes next.
    Resolved(AnswerOutcome),
    /// Offline practice ran out of questions and waits for another batch.
    Refilling,
}

/// Indicates why a session transitioned to [`QuizPhase::Ended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Every question of an online session was presented.
    Exhausted,
    /// The player ended the session explicitly.
    UserEnded,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizEvent {
    /// Questions were fetched; start answering.
    Start,
    /// The current question was submitted, timed out or skipped.
    Resolve(AnswerOutcome),
    /// Present the next loaded question.
    NextQuestion,
    /// Offline practice needs another batch before continuing.
    AwaitRefill,
    /// The refill batch arrived.
    Refilled,
    /// Finish the session.
    End(EndReason),
    /// Leave the results screen and go back to setup.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: QuizPhase,
    /// The event that cannot be applied from this phase.
    pub event: QuizEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// A plan id that does not name the pending transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PendingError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Another plan is pending; the given one was superseded.
    #[error("plan {got} is not the pending plan {expected}")]
    IdMismatch {
        /// Id of the pending plan.
        expected: PlanId,
        /// Id that was provided.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition held back until its asynchronous work completes.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine will transition to.
    pub to: QuizPhase,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: QuizPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<QuizPhase>,
}

/// State machine sequencing a quiz session from setup to the results screen.
#[derive(Debug, Clone)]
pub struct QuizStateMachine {
    phase: QuizPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for QuizStateMachine {
    fn default() -> Self {
        Self {
            phase: QuizPhase::Setup,
            version: 0,
            pending: None,
        }
    }
}

impl QuizStateMachine {
    /// Create a new state machine initialised in the setup state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> QuizPhase {
        self.phase.clone()
    }

    /// Whether a planned transition is waiting to be applied or aborted.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase.clone(),
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to.clone()),
        }
    }

    /// Validate `event` against the current phase and hold the transition until it is
    /// applied or aborted. Only one plan may be pending at a time.
    pub fn plan(&mut self, event: QuizEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        let to = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;
        let plan = Plan {
            id: Uuid::new_v4(),
            to,
        };
        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Move to the phase of the pending plan `plan_id`.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<QuizPhase, PendingError> {
        let plan = self.take_pending(plan_id)?;
        self.enter(plan.to);
        Ok(self.phase.clone())
    }

    /// Drop the pending plan `plan_id`; the phase is unchanged.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), PendingError> {
        self.take_pending(plan_id).map(|_| ())
    }

    /// Validate and apply a transition that needs no asynchronous work.
    pub fn fire(&mut self, event: QuizEvent) -> Result<QuizPhase, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        let to = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;
        self.enter(to);
        Ok(self.phase.clone())
    }

    fn take_pending(&mut self, plan_id: PlanId) -> Result<Plan, PendingError> {
        match self.pending.take() {
            Some(plan) if plan.id == plan_id => Ok(plan),
            Some(plan) => {
                let expected = plan.id;
                self.pending = Some(plan);
                Err(PendingError::IdMismatch {
                    expected,
                    got: plan_id,
                })
            }
            None => Err(PendingError::NoPending),
        }
    }

    fn enter(&mut self, phase: QuizPhase) {
        self.phase = phase;
        self.version += 1;
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: QuizEvent) -> Result<QuizPhase, InvalidTransition> {
        let next = match (self.phase.clone(), event) {
            (QuizPhase::Setup, QuizEvent::Start) => QuizPhase::Running(RunningPhase::Answering),
            (QuizPhase::Running(RunningPhase::Answering), QuizEvent::Resolve(outcome)) => {
                QuizPhase::Running(RunningPhase::Resolved(outcome))
            }
            (QuizPhase::Running(RunningPhase::Resolved(_)), QuizEvent::NextQuestion) => {
                QuizPhase::Running(RunningPhase::Answering)
            }
            (QuizPhase::Running(RunningPhase::Resolved(_)), QuizEvent::AwaitRefill) => {
                QuizPhase::Running(RunningPhase::Refilling)
            }
            (QuizPhase::Running(RunningPhase::Refilling), QuizEvent::Refilled) => {
                QuizPhase::Running(RunningPhase::Answering)
            }
            (QuizPhase::Running(_), QuizEvent::End(..)) => QuizPhase::Ended,
            (QuizPhase::Ended, QuizEvent::Reset) => QuizPhase::Setup,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut QuizStateMachine, event: QuizEvent) -> QuizPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_setup() {
        let sm = QuizStateMachine::new();
        assert_eq!(sm.phase(), QuizPhase::Setup);
    }

    #[test]
    fn full_happy_path_through_session() {
        let mut sm = QuizStateMachine::new();

        assert_eq!(
            apply(&mut sm, QuizEvent::Start),
            QuizPhase::Running(RunningPhase::Answering)
        );
        assert_eq!(
            apply(&mut sm, QuizEvent::Resolve(AnswerOutcome::Correct)),
            QuizPhase::Running(RunningPhase::Resolved(AnswerOutcome::Correct))
        );
        assert_eq!(
            apply(&mut sm, QuizEvent::NextQuestion),
            QuizPhase::Running(RunningPhase::Answering)
        );
        assert_eq!(
            apply(&mut sm, QuizEvent::Resolve(AnswerOutcome::TimedOut)),
            QuizPhase::Running(RunningPhase::Resolved(AnswerOutcome::TimedOut))
        );
        assert_eq!(
            apply(&mut sm, QuizEvent::End(EndReason::Exhausted)),
            QuizPhase::Ended
        );
        assert_eq!(apply(&mut sm, QuizEvent::Reset), QuizPhase::Setup);
        assert_eq!(sm.snapshot().version, 6);
    }

    #[test]
    fn refill_cycle_returns_to_answering() {
        let mut sm = QuizStateMachine::new();
        apply(&mut sm, QuizEvent::Start);
        apply(&mut sm, QuizEvent::Resolve(AnswerOutcome::Skipped));

        assert_eq!(
            apply(&mut sm, QuizEvent::AwaitRefill),
            QuizPhase::Running(RunningPhase::Refilling)
        );
        assert_eq!(
            apply(&mut sm, QuizEvent::Refilled),
            QuizPhase::Running(RunningPhase::Answering)
        );
    }

    #[test]
    fn end_is_accepted_from_any_running_sub_phase() {
        let mut sm = QuizStateMachine::new();
        apply(&mut sm, QuizEvent::Start);
        apply(&mut sm, QuizEvent::Resolve(AnswerOutcome::Wrong));
        apply(&mut sm, QuizEvent::AwaitRefill);

        assert_eq!(
            apply(&mut sm, QuizEvent::End(EndReason::UserEnded)),
            QuizPhase::Ended
        );
    }

    #[test]
    fn resolving_twice_is_rejected() {
        let mut sm = QuizStateMachine::new();
        apply(&mut sm, QuizEvent::Start);
        apply(&mut sm, QuizEvent::Resolve(AnswerOutcome::Correct));

        let err = sm
            .plan(QuizEvent::Resolve(AnswerOutcome::Correct))
            .unwrap_err();
        match err {
            PlanError::InvalidTransition(InvalidTransition { from, .. }) => assert_eq!(
                from,
                QuizPhase::Running(RunningPhase::Resolved(AnswerOutcome::Correct))
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn ending_twice_is_an_invalid_transition() {
        let mut sm = QuizStateMachine::new();
        apply(&mut sm, QuizEvent::Start);
        apply(&mut sm, QuizEvent::End(EndReason::UserEnded));

        let err = sm.plan(QuizEvent::End(EndReason::UserEnded)).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition(_)));
    }

    #[test]
    fn pending_plan_blocks_other_plans() {
        let mut sm = QuizStateMachine::new();
        let plan = sm.plan(QuizEvent::Start).unwrap();
        assert_eq!(sm.plan(QuizEvent::Start).unwrap_err(), PlanError::AlreadyPending);
        assert_eq!(
            sm.snapshot().pending,
            Some(QuizPhase::Running(RunningPhase::Answering))
        );
        sm.apply(plan.id).unwrap();
        assert!(!sm.has_pending());
    }

    #[test]
    fn abort_clears_pending_and_keeps_phase() {
        let mut sm = QuizStateMachine::new();
        let plan = sm.plan(QuizEvent::Start).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.phase(), QuizPhase::Setup);
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan_pending() {
        let mut sm = QuizStateMachine::new();
        sm.plan(QuizEvent::Start).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, PendingError::IdMismatch { .. }));
        assert!(sm.has_pending());
        assert_eq!(sm.phase(), QuizPhase::Setup);
    }

    #[test]
    fn aborted_plan_cannot_be_applied() {
        let mut sm = QuizStateMachine::new();
        let plan = sm.plan(QuizEvent::Start).unwrap();
        sm.abort(plan.id).unwrap();

        assert_eq!(sm.apply(plan.id).unwrap_err(), PendingError::NoPending);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn fire_is_refused_while_a_plan_is_pending() {
        let mut sm = QuizStateMachine::new();
        sm.plan(QuizEvent::Start).unwrap();
        assert_eq!(
            sm.fire(QuizEvent::Start).unwrap_err(),
            PlanError::AlreadyPending
        );
    }
}
