//! Single actor driving a [`SessionEngine`]: UI commands, countdown ticks and fetch
//! completions are processed one at a time. Fetches run as spawned tasks and report back
//! tagged with their session id, so a result that outlives its session is dropped.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::question_source::{BatchRequest, QuestionSources, SourceResult},
    error::SessionError,
    services::{
        progress_service::ProgressTracker,
        reconciler::{BoardSource, ResolvedBoard, ScoreReconciler},
        session_engine::{Advance, SessionEngine, SubmitTrigger, Tick},
        timer::{QuestionTimer, TimerTick},
    },
    state::{
        quiz::{Mode, Question, QuestionView, SessionConfig, SessionSummary},
        state_machine::QuizPhase,
    },
};

/// Pause before asking the offline bank again after a failed refill.
pub const REFILL_RETRY_DELAY: Duration = Duration::from_secs(2);
const COMMAND_BUFFER: usize = 32;

/// Player intents accepted by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Start a session with these settings.
    Start(SessionConfig),
    /// Submit the selected option, if any.
    Submit(Option<String>),
    /// Skip the current question.
    Skip,
    /// End the session (or cancel a start still loading).
    End,
    /// Leave the session or results screen and return to setup.
    Reset,
}

/// Session that reached the results screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSession {
    /// Final tally.
    pub summary: SessionSummary,
    /// Store that accepted the score; `None` offline or when both stores failed.
    pub recorded_in: Option<BoardSource>,
    /// Authoritative board after the hand-off; online sessions only.
    pub board: Option<ResolvedBoard>,
}

/// What the UI should render next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Show this question.
    Question(QuestionView),
    /// Seconds left on the current question.
    Countdown(u32),
    /// Submit was pressed without a selection; re-prompt.
    SelectionRequired,
    /// The session could not start; the engine is back in setup.
    StartFailed(String),
    /// Offline practice is loading more questions.
    Refilling,
    /// Loading more questions failed; the runner retries on its own.
    RefillFailed(String),
    /// The session ended.
    Finished(Box<FinishedSession>),
    /// Back in setup.
    Idle,
    /// The command made no sense in the current phase.
    Rejected(String),
}

#[derive(Debug)]
enum FetchResult {
    Start {
        session_id: Uuid,
        result: SourceResult<Vec<Question>>,
    },
    Refill {
        session_id: Uuid,
        result: SourceResult<Vec<Question>>,
    },
}

/// UI side of a running [`SessionRunner`].
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
}

impl SessionHandle {
    /// Queue a command; `false` once the runner is gone.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Next update, `None` once the runner is gone.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }
}

/// Collaborators of the runner.
#[derive(Clone)]
pub struct RunnerDeps {
    /// Online and offline question sources.
    pub sources: QuestionSources,
    /// Leaderboard hand-off for online sessions.
    pub reconciler: ScoreReconciler,
    /// Local progress bookkeeping.
    pub progress: ProgressTracker,
}

/// Actor owning the engine and its countdown.
pub struct SessionRunner {
    engine: SessionEngine,
    timer: QuestionTimer,
    ticks: mpsc::UnboundedReceiver<TimerTick>,
    fetch_tx: mpsc::UnboundedSender<FetchResult>,
    fetch_rx: mpsc::UnboundedReceiver<FetchResult>,
    commands: mpsc::Receiver<SessionCommand>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    deps: RunnerDeps,
    started_at: Option<Instant>,
}

impl SessionRunner {
    /// Spawn the actor on the current runtime.
    pub fn spawn(deps: RunnerDeps) -> (SessionHandle, JoinHandle<()>) {
        Self::spawn_with_engine(deps, SessionEngine::new())
    }

    /// Spawn the actor around a preconfigured engine.
    pub fn spawn_with_engine(
        deps: RunnerDeps,
        engine: SessionEngine,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();

        let runner = Self {
            engine,
            timer: QuestionTimer::new(tick_tx),
            ticks: tick_rx,
            fetch_tx,
            fetch_rx,
            commands: command_rx,
            updates: update_tx,
            deps,
            started_at: None,
        };
        let task = tokio::spawn(runner.run());

        (
            SessionHandle {
                commands: command_tx,
                updates: update_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(tick) = self.ticks.recv() => self.handle_tick(tick).await,
                Some(fetched) = self.fetch_rx.recv() => self.handle_fetch(fetched).await,
            }
        }
        self.timer.cancel();
        debug!("session runner stopped");
    }

    fn emit(&self, update: SessionUpdate) {
        if self.updates.send(update).is_err() {
            debug!("session update dropped, ui is gone");
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start(config) => self.start(config),
            SessionCommand::Submit(selection) => {
                let result = self.engine.submit(selection.as_deref(), SubmitTrigger::User);
                self.after_resolve(result).await;
            }
            SessionCommand::Skip => {
                let result = self.engine.skip();
                self.after_resolve(result).await;
            }
            SessionCommand::End => {
                self.timer.cancel();
                match self.engine.end() {
                    Ok(Some(summary)) => self.finish(summary).await,
                    Ok(None) if self.engine.phase() == QuizPhase::Setup => {
                        self.emit(SessionUpdate::Idle)
                    }
                    Ok(None) => {}
                    Err(err) => self.emit(SessionUpdate::Rejected(err.to_string())),
                }
            }
            SessionCommand::Reset => {
                self.timer.cancel();
                self.engine.cancel_start();
                if matches!(self.engine.phase(), QuizPhase::Running(_)) {
                    // Navigating away abandons the session without a hand-off.
                    if let Ok(Some(summary)) = self.engine.end() {
                        info!(score = summary.score, total = summary.total, "session abandoned");
                    }
                }
                self.started_at = None;
                match self.engine.reset() {
                    Ok(()) => self.emit(SessionUpdate::Idle),
                    Err(err) => self.emit(SessionUpdate::Rejected(err.to_string())),
                }
            }
        }
    }

    fn start(&mut self, config: SessionConfig) {
        if self.engine.phase() == QuizPhase::Ended {
            // Play again straight from the results screen.
            let _ = self.engine.reset();
        }

        let ticket = match self.engine.begin_start(config) {
            Ok(ticket) => ticket,
            Err(err @ (SessionError::Busy | SessionError::InvalidTransition(_))) => {
                // The session already starting or running is left alone.
                self.emit(SessionUpdate::Rejected(err.to_string()));
                return;
            }
            Err(err) => {
                self.emit(SessionUpdate::StartFailed(err.to_string()));
                return;
            }
        };

        info!(
            mode = %ticket.mode,
            category = %ticket.request.category,
            count = ticket.request.count,
            "starting quiz session"
        );
        let source = self.deps.sources.for_mode(ticket.mode);
        let fetch = source.fetch(ticket.request);
        let tx = self.fetch_tx.clone();
        let session_id = ticket.session_id;
        tokio::spawn(async move {
            let result = fetch.await;
            let _ = tx.send(FetchResult::Start { session_id, result });
        });
    }

    fn spawn_refill(&self, session_id: Uuid, request: BatchRequest, delay: Option<Duration>) {
        let source = self.deps.sources.for_mode(Mode::Offline);
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            let result = source.fetch(request).await;
            let _ = tx.send(FetchResult::Refill { session_id, result });
        });
    }

    async fn after_resolve(&mut self, result: Result<Advance, SessionError>) {
        match result {
            Ok(advance) => self.advance(advance).await,
            Err(SessionError::SelectionRequired) => self.emit(SessionUpdate::SelectionRequired),
            Err(err) => self.emit(SessionUpdate::Rejected(err.to_string())),
        }
    }

    async fn advance(&mut self, advance: Advance) {
        match advance {
            Advance::Next(view) => self.show(view),
            Advance::NeedsRefill {
                session_id,
                request,
            } => {
                self.timer.cancel();
                self.emit(SessionUpdate::Refilling);
                self.spawn_refill(session_id, request, None);
            }
            Advance::Finished(summary) => {
                self.timer.cancel();
                self.finish(summary).await;
            }
        }
    }

    fn show(&mut self, view: QuestionView) {
        if view.time_limit_secs.is_some() {
            self.timer.arm();
        } else {
            self.timer.cancel();
        }
        self.emit(SessionUpdate::Question(view));
    }

    async fn handle_tick(&mut self, tick: TimerTick) {
        if !self.timer.is_current(tick) {
            return;
        }
        match self.engine.tick() {
            Ok(Tick::Idle) => self.timer.cancel(),
            Ok(Tick::Remaining(seconds)) => self.emit(SessionUpdate::Countdown(seconds)),
            Ok(Tick::Expired(advance)) => {
                self.emit(SessionUpdate::Countdown(0));
                self.advance(advance).await;
            }
            Err(err) => {
                warn!(error = %err, "countdown tick rejected");
                self.timer.cancel();
            }
        }
    }

    async fn handle_fetch(&mut self, fetched: FetchResult) {
        match fetched {
            FetchResult::Start { session_id, result } => {
                match self.engine.finish_start(session_id, result) {
                    Ok(view) => {
                        self.started_at = Some(Instant::now());
                        if let Some(session) = self.engine.session() {
                            self.deps.progress.save_last_settings(&session.config);
                        }
                        self.show(view);
                    }
                    Err(SessionError::Stale) => {
                        debug!(%session_id, "discarding start fetch for a cancelled session")
                    }
                    Err(err) => {
                        warn!(error = %err, "quiz session failed to start");
                        self.emit(SessionUpdate::StartFailed(err.to_string()));
                    }
                }
            }
            FetchResult::Refill { session_id, result } => {
                match self.engine.accept_refill(session_id, result) {
                    Ok(view) => self.show(view),
                    Err(SessionError::Stale) => {
                        debug!(%session_id, "discarding refill for an inactive session")
                    }
                    Err(err) => {
                        warn!(error = %err, "offline refill failed");
                        self.emit(SessionUpdate::RefillFailed(err.to_string()));
                        if let Some((session_id, request)) = self.engine.refill_request() {
                            self.spawn_refill(session_id, request, Some(REFILL_RETRY_DELAY));
                        }
                    }
                }
            }
        }
    }

    async fn finish(&mut self, summary: SessionSummary) {
        let secs = self
            .started_at
            .take()
            .map(|started| started.elapsed().as_secs_f64().round().max(1.0) as u64)
            .unwrap_or(0);
        info!(
            player = %summary.config.name,
            score = summary.score,
            total = summary.total,
            mode = %summary.config.mode,
            "quiz session finished"
        );

        let (recorded_in, board) = match summary.config.mode {
            Mode::Online => {
                let category = &summary.config.category;
                let recorded_in = match self
                    .deps
                    .reconciler
                    .record_score(&summary.config.name, u64::from(summary.score), category)
                    .await
                {
                    Ok(outcome) => Some(outcome.stored_in),
                    Err(err) => {
                        warn!(error = %err, "score could not be recorded anywhere");
                        None
                    }
                };
                let board = self.deps.reconciler.get_board(category).await;
                (recorded_in, Some(board))
            }
            Mode::Offline => (None, None),
        };

        self.deps
            .progress
            .record_session(&summary, secs, OffsetDateTime::now_utc());
        self.emit(SessionUpdate::Finished(Box::new(FinishedSession {
            summary,
            recorded_in,
            board,
        })));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{SeedableRng, rngs::StdRng};
    use tokio::time::timeout;

    use super::*;
    use crate::{
        dao::{kv_store::MemoryStore, local_board::LocalLeaderboard},
        services::testing::{FakeRemote, ScriptedSource, questions},
        state::quiz::{Category, Difficulty},
    };

    struct Harness {
        handle: SessionHandle,
        remote: Arc<FakeRemote>,
        progress: ProgressTracker,
    }

    fn harness(online: ScriptedSource, offline: ScriptedSource) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let progress = ProgressTracker::new(store.clone());
        let deps = RunnerDeps {
            sources: QuestionSources::new(Arc::new(online), Arc::new(offline)),
            reconciler: ScoreReconciler::new(remote.clone(), LocalLeaderboard::new(store)),
            progress: progress.clone(),
        };
        let (handle, _task) =
            SessionRunner::spawn_with_engine(deps, SessionEngine::with_rng(StdRng::seed_from_u64(9)));
        Harness {
            handle,
            remote,
            progress,
        }
    }

    fn math(mode: Mode, count: u32) -> SessionConfig {
        SessionConfig::new("Ann", mode, Category::new("19"), Difficulty::Easy, count)
    }

    /// `Q<i>` is answered by `A<i>`.
    fn answer_for(view: &QuestionView) -> String {
        view.text.replacen('Q', "A", 1)
    }

    async fn next(handle: &mut SessionHandle) -> SessionUpdate {
        timeout(Duration::from_secs(120), handle.next_update())
            .await
            .expect("runner went quiet")
            .expect("runner stopped")
    }

    async fn next_question(handle: &mut SessionHandle) -> QuestionView {
        loop {
            match next(handle).await {
                SessionUpdate::Question(view) => return view,
                SessionUpdate::Countdown(_) | SessionUpdate::Refilling => {}
                other => panic!("unexpected update {other:?}"),
            }
        }
    }

    async fn finished(handle: &mut SessionHandle) -> FinishedSession {
        loop {
            match next(handle).await {
                SessionUpdate::Finished(done) => return *done,
                SessionUpdate::Countdown(_) | SessionUpdate::Question(_) => {}
                other => panic!("unexpected update {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn answering_everything_scores_five_of_five_and_records_remotely() {
        let mut h = harness(
            ScriptedSource::with_pool(questions(5)),
            ScriptedSource::default(),
        );
        h.handle.send(SessionCommand::Start(math(Mode::Online, 5))).await;

        for _ in 0..4 {
            let view = next_question(&mut h.handle).await;
            h.handle
                .send(SessionCommand::Submit(Some(answer_for(&view))))
                .await;
        }
        let view = next_question(&mut h.handle).await;
        assert_eq!(view.counter_label(), "Question 5 / 5");
        h.handle
            .send(SessionCommand::Submit(Some(answer_for(&view))))
            .await;
        let done = finished(&mut h.handle).await;

        assert_eq!((done.summary.score, done.summary.total), (5, 5));
        assert_eq!(done.recorded_in, Some(BoardSource::Remote));
        let board = done.board.unwrap();
        assert_eq!(board.source, BoardSource::Remote);
        assert_eq!(board.board.get("Ann"), Some(&5));
        assert_eq!(h.progress.lifetime().total_correct, 5);
        assert_eq!(h.progress.last_settings(), Some(math(Mode::Online, 5)));
    }

    #[tokio::test(start_paused = true)]
    async fn letting_every_question_time_out_scores_zero() {
        let mut h = harness(
            ScriptedSource::with_pool(questions(5)),
            ScriptedSource::default(),
        );
        h.handle.send(SessionCommand::Start(math(Mode::Online, 5))).await;

        let mut countdown = Vec::new();
        let done = loop {
            match next(&mut h.handle).await {
                SessionUpdate::Countdown(seconds) => countdown.push(seconds),
                SessionUpdate::Question(_) => {}
                SessionUpdate::Finished(done) => break *done,
                other => panic!("unexpected update {other:?}"),
            }
        };

        assert_eq!((done.summary.score, done.summary.total), (0, 5));
        assert_eq!(&countdown[..15], &(0..15).rev().collect::<Vec<u32>>()[..]);
        assert_eq!(countdown.len(), 5 * 15);
        assert_eq!(h.remote.board(&Category::new("19")).get("Ann"), Some(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_selection_is_reprompted() {
        let mut h = harness(
            ScriptedSource::with_pool(questions(3)),
            ScriptedSource::default(),
        );
        h.handle.send(SessionCommand::Start(math(Mode::Online, 3))).await;
        next_question(&mut h.handle).await;

        h.handle.send(SessionCommand::Submit(None)).await;

        loop {
            match next(&mut h.handle).await {
                SessionUpdate::SelectionRequired => break,
                SessionUpdate::Countdown(_) => {}
                other => panic!("unexpected update {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_online_fetch_fails_the_start() {
        let online = ScriptedSource::default();
        online.push(Ok(Vec::new()));
        let mut h = harness(online, ScriptedSource::default());

        h.handle.send(SessionCommand::Start(math(Mode::Online, 5))).await;

        match next(&mut h.handle).await {
            SessionUpdate::StartFailed(message) => {
                assert!(message.contains("could not fetch questions"))
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_fetch_finishing_after_end_is_discarded() {
        let mut h = harness(
            ScriptedSource::with_pool(questions(5)).delayed(Duration::from_secs(5)),
            ScriptedSource::default(),
        );

        h.handle.send(SessionCommand::Start(math(Mode::Online, 5))).await;
        h.handle.send(SessionCommand::End).await;

        assert_eq!(next(&mut h.handle).await, SessionUpdate::Idle);
        let late = timeout(Duration::from_secs(30), h.handle.next_update()).await;
        assert!(late.is_err(), "stale fetch resurrected the session: {late:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_loading_is_rejected() {
        let mut h = harness(
            ScriptedSource::with_pool(questions(5)).delayed(Duration::from_secs(2)),
            ScriptedSource::default(),
        );

        h.handle.send(SessionCommand::Start(math(Mode::Online, 5))).await;
        h.handle.send(SessionCommand::Start(math(Mode::Online, 5))).await;

        match next(&mut h.handle).await {
            SessionUpdate::Rejected(message) => assert!(message.contains("pending")),
            other => panic!("unexpected update {other:?}"),
        }
        let first = next_question(&mut h.handle).await;
        assert_eq!(first.index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_practice_refills_and_never_touches_the_board() {
        let offline = ScriptedSource::with_pool(questions(4));
        offline.push(Ok(questions(1)));
        let mut h = harness(ScriptedSource::default(), offline);

        h.handle.send(SessionCommand::Start(math(Mode::Offline, 5))).await;
        let first = next_question(&mut h.handle).await;
        assert_eq!(first.total, None);

        h.handle.send(SessionCommand::Skip).await;
        assert_eq!(next(&mut h.handle).await, SessionUpdate::Refilling);
        let second = next_question(&mut h.handle).await;
        assert_eq!(second.index, 1);

        h.handle.send(SessionCommand::End).await;
        let done = finished(&mut h.handle).await;

        assert_eq!((done.summary.score, done.summary.total), (0, 1));
        assert_eq!(done.board, None);
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.progress.recent()[0].mode, Mode::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_abandons_a_running_session() {
        let mut h = harness(
            ScriptedSource::with_pool(questions(5)),
            ScriptedSource::default(),
        );
        h.handle.send(SessionCommand::Start(math(Mode::Online, 5))).await;
        next_question(&mut h.handle).await;

        h.handle.send(SessionCommand::Reset).await;

        loop {
            match next(&mut h.handle).await {
                SessionUpdate::Idle => break,
                SessionUpdate::Countdown(_) => {}
                other => panic!("unexpected update {other:?}"),
            }
        }
        assert!(h.remote.calls().is_empty());
        assert!(
            timeout(Duration::from_secs(30), h.handle.next_update())
                .await
                .is_err()
        );
    }
}
