use std::{fmt, time::Duration};

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// Leaderboard bucket used when no category is supplied.
pub const GLOBAL_CATEGORY: &str = "global";
/// Name given to players who leave the name field blank.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// Category keys known to the built-in question bank, in display order.
pub const KNOWN_CATEGORIES: [&str; 4] = ["19", "18", "17", "23"];

/// Quiz subject bucket used both to select questions and to partition leaderboards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Build a category from a raw key; blank keys collapse to the global bucket.
    pub fn new(key: impl AsRef<str>) -> Self {
        let key = key.as_ref().trim();
        if key.is_empty() {
            Self::global()
        } else {
            Self(key.to_string())
        }
    }

    /// The sentinel bucket shared by uncategorised scores.
    pub fn global() -> Self {
        Self(GLOBAL_CATEGORY.to_string())
    }

    /// Raw key used on the wire and in storage.
    pub fn key(&self) -> &str {
        &self.0
    }

    /// True for the sentinel bucket.
    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_CATEGORY
    }

    /// Human readable subject name.
    pub fn display_name(&self) -> &str {
        match self.0.as_str() {
            "19" => "Math",
            "18" => "CS",
            "17" => "Science",
            "23" => "History",
            other => other,
        }
    }

    /// File stem of the optional overlay bank for this category.
    pub fn bank_name(&self) -> Option<&'static str> {
        match self.0.as_str() {
            "19" => Some("math"),
            "18" => Some("cs"),
            "17" => Some("science"),
            "23" => Some("history"),
            _ => None,
        }
    }

    /// Category id forwarded to the trivia API, absent for the global bucket.
    pub fn api_id(&self) -> Option<&str> {
        (!self.is_global()).then_some(self.0.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Difficulty selected at setup; drives the per-question countdown in online mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// 15 seconds per question.
    #[default]
    Easy,
    /// 10 seconds per question.
    Medium,
    /// 5 seconds per question.
    Hard,
}

impl Difficulty {
    /// Every difficulty, in the order used by the daily challenge rotation.
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Whole seconds granted per question.
    pub fn time_limit_secs(self) -> u32 {
        match self {
            Difficulty::Hard => 5,
            Difficulty::Medium => 10,
            Difficulty::Easy => 15,
        }
    }

    /// Countdown duration granted per question.
    pub fn time_limit(self) -> Duration {
        Duration::from_secs(u64::from(self.time_limit_secs()))
    }

    /// Query-string value understood by the trivia API.
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

/// Operating mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Bounded, timed session scored on the shared leaderboard.
    Online,
    /// Unbounded untimed practice that never touches the leaderboard.
    #[default]
    Offline,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Online => f.write_str("online"),
            Mode::Offline => f.write_str("offline"),
        }
    }
}

/// Errors raised while building a [`Question`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionError {
    /// The prompt text was blank.
    #[error("question text must not be empty")]
    EmptyText,
    /// The correct answer was blank.
    #[error("correct answer must not be empty")]
    EmptyAnswer,
    /// Fewer than two distinct options remained.
    #[error("a question needs at least two distinct options (got {0})")]
    TooFewOptions(usize),
}

/// Immutable multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    text: String,
    correct_answer: String,
    options: Vec<String>,
}

impl Question {
    /// Build a question, deduplicating options and making sure the correct answer is offered.
    pub fn new(
        text: impl Into<String>,
        correct_answer: impl Into<String>,
        options: impl IntoIterator<Item = String>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        let correct_answer = correct_answer.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if correct_answer.trim().is_empty() {
            return Err(QuestionError::EmptyAnswer);
        }

        let mut unique: Vec<String> = Vec::new();
        for option in options {
            if !unique.iter().any(|existing| existing == &option) {
                unique.push(option);
            }
        }
        if !unique.iter().any(|option| answers_match(option, &correct_answer)) {
            unique.push(correct_answer.clone());
        }
        if unique.len() < 2 {
            return Err(QuestionError::TooFewOptions(unique.len()));
        }

        Ok(Self {
            text,
            correct_answer,
            options: unique,
        })
    }

    /// Prompt shown to the player.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Expected answer.
    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    /// Options in their stored order.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Case-insensitive comparison against the correct answer.
    pub fn is_correct(&self, answer: &str) -> bool {
        answers_match(answer, &self.correct_answer)
    }

    /// Independent uniform permutation of the options for one presentation.
    pub fn shuffled_options<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        let mut options = self.options.clone();
        options.shuffle(rng);
        options
    }
}

fn answers_match(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}

/// Settings captured at session start; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Display name credited on the leaderboard.
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Online (timed, bounded) or offline (untimed practice).
    pub mode: Mode,
    /// Subject bucket.
    pub category: Category,
    /// Difficulty, also selecting the countdown length online.
    pub difficulty: Difficulty,
    /// Number of questions requested for an online session.
    #[validate(range(min = 1))]
    pub num_questions: u32,
}

impl SessionConfig {
    /// Build a config from raw user input, defaulting a blank name.
    pub fn new(
        name: &str,
        mode: Mode,
        category: Category,
        difficulty: Difficulty,
        num_questions: u32,
    ) -> Self {
        let name = name.trim();
        Self {
            name: if name.is_empty() {
                DEFAULT_PLAYER_NAME.to_string()
            } else {
                name.to_string()
            },
            mode,
            category,
            difficulty,
            num_questions,
        }
    }

    /// Countdown armed for each question, if any.
    pub fn time_limit_secs(&self) -> Option<u32> {
        match self.mode {
            Mode::Online => Some(self.difficulty.time_limit_secs()),
            Mode::Offline => None,
        }
    }
}

/// How a presented question was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Explicit matching selection; the only outcome awarding a point.
    Correct,
    /// Explicit non-matching selection.
    Wrong,
    /// The countdown ran out.
    TimedOut,
    /// The player skipped.
    Skipped,
}

impl AnswerOutcome {
    /// Points awarded for this outcome.
    pub fn points(self) -> u32 {
        u32::from(matches!(self, AnswerOutcome::Correct))
    }
}

/// In-progress quiz data owned by the session engine.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Identifier used to discard fetch results that outlive the session.
    pub id: Uuid,
    /// Settings the session was started with.
    pub config: SessionConfig,
    /// Questions fetched so far (offline sessions grow this on refill).
    pub questions: Vec<Question>,
    /// Position of the question being answered.
    pub index: usize,
    /// Points earned so far.
    pub score: u32,
    /// Seconds left on the countdown; `None` when no timer is armed.
    pub remaining_seconds: Option<u32>,
    /// Per-question outcomes in presentation order.
    pub outcomes: Vec<AnswerOutcome>,
}

impl SessionState {
    /// Fresh state with the initial batch of questions.
    pub fn new(config: SessionConfig, questions: Vec<Question>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            questions,
            index: 0,
            score: 0,
            remaining_seconds: None,
            outcomes: Vec::new(),
        }
    }

    /// Question at the current index, if one is loaded.
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.index)
    }

    /// Whether every loaded question has been presented.
    pub fn is_exhausted(&self) -> bool {
        self.index >= self.questions.len()
    }

    /// Record the outcome of the current question and advance.
    pub fn resolve(&mut self, outcome: AnswerOutcome) {
        self.score += outcome.points();
        self.outcomes.push(outcome);
        self.index += 1;
        self.remaining_seconds = None;
    }
}

/// One presentation of the current question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    /// Zero-based position in the session.
    pub index: usize,
    /// Number of questions in an online session; `None` for unlimited practice.
    pub total: Option<usize>,
    /// Prompt text.
    pub text: String,
    /// Options in a freshly shuffled order.
    pub options: Vec<String>,
    /// Countdown length for this question, if timed.
    pub time_limit_secs: Option<u32>,
}

impl QuestionView {
    /// Counter label such as `Question 2 / 5` or `Question 7 (Offline • Unlimited)`.
    pub fn counter_label(&self) -> String {
        match self.total {
            Some(total) => format!("Question {} / {}", self.index + 1, total),
            None => format!("Question {} (Offline • Unlimited)", self.index + 1),
        }
    }
}

/// Final tally handed to the leaderboard and the progress tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Settings the session ran with.
    pub config: SessionConfig,
    /// Points earned.
    pub score: u32,
    /// Questions presented and resolved (not the number fetched).
    pub total: u32,
    /// Per-question outcomes.
    pub outcomes: Vec<AnswerOutcome>,
}

impl SessionSummary {
    /// Result line shown on the results screen.
    pub fn score_line(&self) -> String {
        format!(
            "{}, your score is {} / {}",
            self.config.name, self.score, self.total
        )
    }
}
