//! Device-local progress: quick-start settings, lifetime totals, achievements, recent
//! sessions, the daily streak and the daily challenge. Every write is best effort; a
//! storage failure is logged and the quiz carries on.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        kv_store::{KeyValueStore, StoreKey, TypedStore},
        models::Board,
        storage::StorageResult,
    },
    state::quiz::{
        Category, DEFAULT_PLAYER_NAME, Difficulty, KNOWN_CATEGORIES, Mode, SessionConfig,
        SessionSummary,
    },
};

/// Settings of the last successfully started session.
pub const LAST_SETTINGS_KEY: StoreKey<SessionConfig> = StoreKey::new("trivia_last_settings");
/// Lifetime aggregate statistics.
pub const LIFETIME_KEY: StoreKey<LifetimeStats> = StoreKey::new("trivia_lifetime");
/// Sticky achievement flags.
pub const ACHIEVEMENTS_KEY: StoreKey<Achievements> = StoreKey::new("trivia_achievements");
/// Most recent sessions, newest first.
pub const RECENT_KEY: StoreKey<Vec<RecentSession>> = StoreKey::new("trivia_recent");
/// Consecutive days played.
pub const STREAK_KEY: StoreKey<u32> = StoreKey::new("trivia_streak");
/// Day key (`YYYYMMDD`) of the last counted day.
pub const LAST_PLAYED_KEY: StoreKey<u32> = StoreKey::new("trivia_last_played");
/// Random id identifying this device to the presence service.
pub const CLIENT_ID_KEY: StoreKey<String> = StoreKey::new("trivia_client_id");

/// Number of sessions kept in the recent log.
pub const RECENT_LIMIT: usize = 5;
/// Questions in the daily challenge.
pub const DAILY_CHALLENGE_QUESTIONS: u32 = 10;
/// Daily goal: questions answered.
pub const GOAL_ANSWERED: u32 = 20;
/// Daily goal: points scored.
pub const GOAL_SCORE: u32 = 10;
/// Daily goal: online sessions played.
pub const GOAL_ONLINE: u32 = 1;

/// Correct and answered counts for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectTally {
    /// Correct answers.
    pub c: u64,
    /// Questions answered.
    pub a: u64,
}

impl SubjectTally {
    /// Rounded accuracy percentage, 0 when nothing was answered.
    pub fn accuracy_percent(&self) -> u32 {
        if self.a == 0 {
            return 0;
        }
        ((self.c as f64 / self.a as f64) * 100.0).round() as u32
    }
}

/// Totals across every session played on this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifetimeStats {
    /// Sessions completed.
    pub total_quizzes: u64,
    /// Correct answers.
    pub total_correct: u64,
    /// Questions presented.
    pub total_answered: u64,
    /// Longest daily streak seen.
    pub best_streak: u32,
    /// Per-category tallies, seeded for the built-in subjects.
    pub per_subject: BTreeMap<String, SubjectTally>,
}

impl Default for LifetimeStats {
    fn default() -> Self {
        let mut stats = Self {
            total_quizzes: 0,
            total_correct: 0,
            total_answered: 0,
            best_streak: 0,
            per_subject: BTreeMap::new(),
        };
        stats.seed_subjects();
        stats
    }
}

impl LifetimeStats {
    fn seed_subjects(&mut self) {
        for key in KNOWN_CATEGORIES {
            self.per_subject.entry(key.to_string()).or_default();
        }
    }
}

/// Achievement flags; once earned they never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Achievements {
    /// Completed a first quiz.
    pub first_quiz: bool,
    /// Perfect score on a session of at least ten questions.
    #[serde(rename = "perfect10")]
    pub perfect_ten: bool,
    /// Three-day streak.
    pub streak3: bool,
    /// Seven-day streak.
    pub streak7: bool,
    /// At least ten questions in about six seconds each.
    pub speedster: bool,
    /// Fifty lifetime correct answers.
    pub scholar50: bool,
}

/// Entry of the recent-session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentSession {
    /// RFC 3339 timestamp of the end of the session.
    pub date: String,
    /// Subject display name.
    pub subject: String,
    /// Mode played.
    pub mode: Mode,
    /// Difficulty played.
    pub difficulty: Difficulty,
    /// Points earned.
    pub score: u32,
    /// Questions presented.
    pub total: u32,
    /// Wall-clock duration in seconds.
    pub secs: u64,
}

impl RecentSession {
    fn day_key(&self) -> Option<u32> {
        OffsetDateTime::parse(&self.date, &Rfc3339)
            .ok()
            .map(|timestamp| date_key(timestamp.date()))
    }
}

/// Today's progress towards the daily goals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyGoals {
    /// Questions answered today.
    pub answered: u32,
    /// Points scored today.
    pub score: u32,
    /// Online sessions played today.
    pub online: u32,
}

/// Figures shown next to the setup form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeStats {
    /// Players on the board.
    pub total_players: usize,
    /// Highest cumulative score on the board.
    pub top_score: u64,
    /// Current daily streak.
    pub streak: u32,
}

/// `YYYYMMDD` as an integer.
pub fn date_key(date: Date) -> u32 {
    let year = u32::try_from(date.year()).unwrap_or(0);
    year * 10_000 + u32::from(u8::from(date.month())) * 100 + u32::from(date.day())
}

/// Deterministic online challenge for the day: subject rotates by four, difficulty by three.
pub fn daily_challenge(today: Date, name: &str) -> SessionConfig {
    let key = date_key(today) as usize;
    let category = Category::new(KNOWN_CATEGORIES[key % KNOWN_CATEGORIES.len()]);
    let difficulty = Difficulty::ALL[key % Difficulty::ALL.len()];
    SessionConfig::new(
        name,
        Mode::Online,
        category,
        difficulty,
        DAILY_CHALLENGE_QUESTIONS,
    )
}

/// Player count and top score of `board`, with the local streak.
pub fn home_stats(board: &Board, streak: u32) -> HomeStats {
    HomeStats {
        total_players: board.len(),
        top_score: board.values().copied().max().unwrap_or(0),
        streak,
    }
}

/// Progress bookkeeping over the local key-value store.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn KeyValueStore>,
}

impl ProgressTracker {
    /// Wrap a key-value store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Remember `config` for Quick Start.
    pub fn save_last_settings(&self, config: &SessionConfig) {
        log_failure("last settings", self.store.save(LAST_SETTINGS_KEY, config));
    }

    /// Settings of the last started session, if any.
    pub fn last_settings(&self) -> Option<SessionConfig> {
        load_logged(self.store.as_ref(), LAST_SETTINGS_KEY)
    }

    /// Current daily streak.
    pub fn streak(&self) -> u32 {
        self.store.load_or_default(STREAK_KEY)
    }

    /// Lifetime totals with every built-in subject present.
    pub fn lifetime(&self) -> LifetimeStats {
        let mut stats: LifetimeStats = self.store.load_or_default(LIFETIME_KEY);
        stats.seed_subjects();
        stats
    }

    /// Achievement flags.
    pub fn achievements(&self) -> Achievements {
        self.store.load_or_default(ACHIEVEMENTS_KEY)
    }

    /// Recent sessions, newest first.
    pub fn recent(&self) -> Vec<RecentSession> {
        self.store.load_or_default(RECENT_KEY)
    }

    /// Presence id of this device, generated and stored on first use.
    pub fn client_id(&self) -> String {
        if let Ok(Some(id)) = self.store.load(CLIENT_ID_KEY) {
            return id;
        }
        let id = Uuid::new_v4().simple().to_string();
        log_failure("client id", self.store.save(CLIENT_ID_KEY, &id));
        id
    }

    /// Count `today` towards the streak: unchanged if already counted, +1 if the last day
    /// played was yesterday, otherwise back to 1.
    pub fn update_streak(&self, today: Date) -> u32 {
        let today_key = date_key(today);
        let last = load_logged(self.store.as_ref(), LAST_PLAYED_KEY);
        let streak = self.streak();
        if last == Some(today_key) {
            return streak;
        }

        let yesterday = today.previous_day().map(date_key);
        let streak = if last.is_some() && last == yesterday {
            streak + 1
        } else {
            1
        };
        log_failure("streak", self.store.save(STREAK_KEY, &streak));
        log_failure("last played", self.store.save(LAST_PLAYED_KEY, &today_key));
        streak
    }

    /// Fold a finished session into the streak, lifetime totals, achievements and the
    /// recent log.
    pub fn record_session(&self, summary: &SessionSummary, secs: u64, now: OffsetDateTime) {
        let streak = self.update_streak(now.date());
        let lifetime = self.add_to_lifetime(summary, streak);
        self.update_achievements(summary, secs, &lifetime);

        let entry = RecentSession {
            date: now.format(&Rfc3339).unwrap_or_default(),
            subject: summary.config.category.display_name().to_string(),
            mode: summary.config.mode,
            difficulty: summary.config.difficulty,
            score: summary.score,
            total: summary.total,
            secs,
        };
        let mut recent = self.recent();
        recent.insert(0, entry);
        recent.truncate(RECENT_LIMIT);
        log_failure("recent sessions", self.store.save(RECENT_KEY, &recent));
        debug!(score = summary.score, total = summary.total, streak, "recorded session progress");
    }

    fn add_to_lifetime(&self, summary: &SessionSummary, streak: u32) -> LifetimeStats {
        let mut stats = self.lifetime();
        stats.total_quizzes += 1;
        stats.total_correct += u64::from(summary.score);
        stats.total_answered += u64::from(summary.total);
        stats.best_streak = stats.best_streak.max(streak);
        if let Some(tally) = stats.per_subject.get_mut(summary.config.category.key()) {
            tally.c += u64::from(summary.score);
            tally.a += u64::from(summary.total);
        }
        log_failure("lifetime stats", self.store.save(LIFETIME_KEY, &stats));
        stats
    }

    fn update_achievements(
        &self,
        summary: &SessionSummary,
        secs: u64,
        lifetime: &LifetimeStats,
    ) -> Achievements {
        let total = summary.total;
        let mut earned = self.achievements();
        earned.first_quiz |= lifetime.total_quizzes >= 1;
        earned.perfect_ten |= total >= 10 && summary.score == total;
        earned.streak3 |= lifetime.best_streak >= 3;
        earned.streak7 |= lifetime.best_streak >= 7;
        earned.speedster |= total >= 10 && secs > 0 && secs <= u64::from(total) * 6;
        earned.scholar50 |= lifetime.total_correct >= 50;
        log_failure("achievements", self.store.save(ACHIEVEMENTS_KEY, &earned));
        earned
    }

    /// Progress towards today's goals, from the recent log.
    pub fn daily_goals(&self, today: Date) -> DailyGoals {
        let today_key = date_key(today);
        self.recent()
            .iter()
            .filter(|entry| entry.day_key() == Some(today_key))
            .fold(DailyGoals::default(), |mut goals, entry| {
                goals.answered += entry.total;
                goals.score += entry.score;
                if entry.mode == Mode::Online {
                    goals.online += 1;
                }
                goals
            })
    }

    /// Accuracy per built-in subject, in display order.
    pub fn subject_accuracy(&self) -> Vec<(Category, u32)> {
        let lifetime = self.lifetime();
        KNOWN_CATEGORIES
            .iter()
            .map(|key| {
                let tally = lifetime.per_subject.get(*key).copied().unwrap_or_default();
                (Category::new(key), tally.accuracy_percent())
            })
            .collect()
    }

    /// Name to prefill: the last player, else the default.
    pub fn default_name(&self) -> String {
        self.last_settings()
            .map(|config| config.name)
            .unwrap_or_else(|| DEFAULT_PLAYER_NAME.to_string())
    }
}

fn load_logged<T: serde::de::DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: StoreKey<T>,
) -> Option<T> {
    store.load(key).unwrap_or_else(|err| {
        warn!(key = key.name(), error = %err, "local value unreadable");
        None
    })
}

fn log_failure(what: &str, result: StorageResult<()>) {
    if let Err(err) = result {
        warn!(what, error = %err, "failed to save local progress");
    }
}
