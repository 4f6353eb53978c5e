//! Trivia Champ terminal client.
//!
//! ```bash
//! # Ten timed questions on the shared leaderboard
//! trivia-play play --name Alice --mode online --category 19 --difficulty medium -n 10
//!
//! # Replay the last settings, or today's challenge
//! trivia-play quick
//! trivia-play daily
//!
//! # Leaderboard and local progress
//! trivia-play board --category 19
//! trivia-play clear --all
//! trivia-play stats
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trivia_champ::{
    config::{AppConfig, ClientConfig},
    dao::{
        kv_store::{JsonFileStore, KeyValueStore},
        local_board::LocalLeaderboard,
        models::ranked,
        presence_client::PresenceClient,
        question_source::{QuestionSources, offline_bank::OfflineBank, opentdb::OpenTdbClient},
        remote_board::{ClearScope, HttpLeaderboard},
    },
    services::{
        progress_service::{
            GOAL_ANSWERED, GOAL_ONLINE, GOAL_SCORE, ProgressTracker, daily_challenge, home_stats,
        },
        reconciler::{BoardSource, ResolvedBoard, ScoreReconciler},
        session_runner::{FinishedSession, RunnerDeps, SessionCommand, SessionRunner, SessionUpdate},
    },
    state::quiz::{Category, Difficulty, Mode, SessionConfig},
};

/// Trivia Champ - quiz in the terminal
#[derive(Parser)]
#[command(name = "trivia-play")]
#[command(about = "Play Trivia Champ online or offline")]
#[command(version)]
struct Cli {
    /// Leaderboard server base URL
    #[arg(long, global = true)]
    leaderboard_url: Option<String>,
    /// File backing the local store
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session
    Play {
        /// Player name (defaults to the last one used)
        #[arg(short, long)]
        name: Option<String>,
        /// Online sessions are timed and scored on the leaderboard
        #[arg(short, long, value_enum, default_value_t = ModeArg::Offline)]
        mode: ModeArg,
        /// Category id (19 Math, 18 CS, 17 Science, 23 History)
        #[arg(short, long, default_value = "19")]
        category: String,
        /// Difficulty
        #[arg(short, long, value_enum, default_value_t = DifficultyArg::Easy)]
        difficulty: DifficultyArg,
        /// Questions in an online session
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u32,
    },
    /// Replay the last settings
    Quick,
    /// Play today's challenge
    Daily {
        /// Player name (defaults to the last one used)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Show a leaderboard
    Board {
        /// Category id; global when omitted
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Clear a leaderboard
    Clear {
        /// Category id; global when omitted
        #[arg(short, long, conflicts_with = "all")]
        category: Option<String>,
        /// Clear every category
        #[arg(long)]
        all: bool,
    },
    /// Show streak, lifetime stats and achievements
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Online,
    Offline,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Online => Mode::Online,
            ModeArg::Offline => Mode::Offline,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

/// Collaborators shared by every subcommand.
struct Client {
    config: ClientConfig,
    reconciler: ScoreReconciler,
    progress: ProgressTracker,
}

impl Client {
    fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(JsonFileStore::open(&config.local_store_path));
        let remote =
            HttpLeaderboard::new(&config.leaderboard_url).context("building leaderboard client")?;
        let reconciler =
            ScoreReconciler::new(Arc::new(remote), LocalLeaderboard::new(store.clone()));
        let progress = ProgressTracker::new(store);
        Ok(Self {
            config,
            reconciler,
            progress,
        })
    }

    fn runner_deps(&self) -> anyhow::Result<RunnerDeps> {
        let online = OpenTdbClient::new(&self.config.trivia_url, self.config.max_fetch_attempts)
            .context("building trivia client")?;
        let offline = OfflineBank::with_overlay_dir(&self.config.offline_bank_dir);
        Ok(RunnerDeps {
            sources: QuestionSources::new(Arc::new(online), Arc::new(offline)),
            reconciler: self.reconciler.clone(),
            progress: self.progress.clone(),
        })
    }

    fn presence(&self) -> PresenceClient {
        PresenceClient::new(
            reqwest::Client::new(),
            &self.config.leaderboard_url,
            &self.progress.client_id(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::load().client;
    if let Some(url) = cli.leaderboard_url {
        config.leaderboard_url = url;
    }
    if let Some(path) = cli.store {
        config.local_store_path = path;
    }
    let client = Client::new(config)?;

    match cli.command {
        Commands::Play {
            name,
            mode,
            category,
            difficulty,
            count,
        } => {
            let name = name.unwrap_or_else(|| client.progress.default_name());
            let settings = SessionConfig::new(
                &name,
                mode.into(),
                Category::new(category),
                difficulty.into(),
                count,
            );
            cmd_play(&client, settings).await
        }
        Commands::Quick => match client.progress.last_settings() {
            Some(settings) => cmd_play(&client, settings).await,
            None => {
                println!("No previous settings yet. Start one with `trivia-play play`.");
                Ok(())
            }
        },
        Commands::Daily { name } => {
            let name = name.unwrap_or_else(|| client.progress.default_name());
            let today = OffsetDateTime::now_utc().date();
            cmd_play(&client, daily_challenge(today, &name)).await
        }
        Commands::Board { category } => {
            cmd_board(&client, Category::new(category.unwrap_or_default())).await
        }
        Commands::Clear { category, all } => {
            let scope = if all {
                ClearScope::All
            } else {
                ClearScope::Category(Category::new(category.unwrap_or_default()))
            };
            cmd_clear(&client, scope).await
        }
        Commands::Stats => cmd_stats(&client).await,
    }
}

/// Logs go to stderr and default to `warn` so they do not interleave with prompts.
fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn cmd_play(client: &Client, settings: SessionConfig) -> anyhow::Result<()> {
    println!(
        "{} • {} • {} • {}",
        settings.name,
        settings.mode,
        settings.category.display_name(),
        settings.difficulty
    );
    if settings.mode == Mode::Online {
        let presence = client.presence();
        let name = settings.name.clone();
        tokio::spawn(async move {
            if let Some(online) = presence.ping(&name).await {
                println!("{online} player(s) online");
            }
        });
    }

    let (mut handle, task) = SessionRunner::spawn(client.runner_deps()?);
    handle.send(SessionCommand::Start(settings)).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut options: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            update = handle.next_update() => {
                let Some(update) = update else { break };
                match update {
                    SessionUpdate::Question(view) => {
                        println!();
                        println!("{}", view.counter_label());
                        println!("{}", view.text);
                        for (i, option) in view.options.iter().enumerate() {
                            println!("  {}) {}", i + 1, option);
                        }
                        let hint = format!("[1-{}] answer, s skip, e end", view.options.len());
                        match view.time_limit_secs {
                            Some(secs) => println!("{hint} ({secs}s)"),
                            None => println!("{hint}"),
                        }
                        options = view.options;
                    }
                    SessionUpdate::Countdown(0) => println!("Time's up!"),
                    SessionUpdate::Countdown(secs) if secs <= 3 => println!("  {secs}s left"),
                    SessionUpdate::Countdown(_) => {}
                    SessionUpdate::SelectionRequired => println!("Please select an answer first."),
                    SessionUpdate::StartFailed(message) => {
                        println!("{message}");
                        break;
                    }
                    SessionUpdate::Refilling => println!("Loading more questions..."),
                    SessionUpdate::RefillFailed(message) => println!("{message}; retrying"),
                    SessionUpdate::Finished(finished) => {
                        print_results(&finished);
                        break;
                    }
                    SessionUpdate::Idle => break,
                    SessionUpdate::Rejected(message) => println!("{message}"),
                }
            }
            line = lines.next_line(), if stdin_open => {
                let command = match line.context("reading stdin")? {
                    Some(line) => parse_input(line.trim(), &options),
                    None => {
                        stdin_open = false;
                        Some(SessionCommand::End)
                    }
                };
                match command {
                    Some(command) => {
                        handle.send(command).await;
                    }
                    None => println!("Type an option number, s or e."),
                }
            }
        }
    }

    drop(handle);
    task.await.context("session runner panicked")?;
    Ok(())
}

fn parse_input(input: &str, options: &[String]) -> Option<SessionCommand> {
    match input {
        "s" | "S" => Some(SessionCommand::Skip),
        "e" | "E" => Some(SessionCommand::End),
        "" => Some(SessionCommand::Submit(None)),
        number => {
            let choice = number.parse::<usize>().ok()?;
            let option = options.get(choice.checked_sub(1)?)?;
            Some(SessionCommand::Submit(Some(option.clone())))
        }
    }
}

fn print_results(finished: &FinishedSession) {
    println!();
    println!("{}", finished.summary.score_line());
    match finished.recorded_in {
        Some(BoardSource::Remote) => println!("Score saved to the shared leaderboard."),
        Some(BoardSource::Local) => {
            println!("Leaderboard unreachable; score saved on this device.")
        }
        Some(BoardSource::Empty) | None => {}
    }
    if let Some(board) = &finished.board {
        print_board(&finished.summary.config.category, board);
    }
}

fn print_board(category: &Category, resolved: &ResolvedBoard) {
    let origin = match resolved.source {
        BoardSource::Remote => "shared",
        BoardSource::Local => "this device",
        BoardSource::Empty => "empty",
    };
    let title = if category.is_global() {
        "Global"
    } else {
        category.display_name()
    };
    println!("Leaderboard: {title} ({origin})");
    if resolved.board.is_empty() {
        println!("  No scores yet.");
    }
    for (rank, (name, score)) in ranked(&resolved.board).into_iter().enumerate() {
        println!("  {:>2}. {name:<24} {score}", rank + 1);
    }
}

async fn cmd_board(client: &Client, category: Category) -> anyhow::Result<()> {
    let resolved = client.reconciler.get_board(&category).await;
    print_board(&category, &resolved);
    let stats = home_stats(&resolved.board, client.progress.streak());
    println!(
        "Players: {} • Top score: {} • Streak: {}",
        stats.total_players, stats.top_score, stats.streak
    );
    if let Some(online) = client.presence().online_count().await {
        println!("Online now: {online}");
    }
    Ok(())
}

async fn cmd_clear(client: &Client, scope: ClearScope) -> anyhow::Result<()> {
    let report = client.reconciler.clear(&scope).await;
    if report.local_cleared {
        println!("Leaderboard cleared.");
    } else {
        println!("Local leaderboard could not be cleared.");
    }
    if !report.remote_cleared {
        println!("The shared leaderboard was not reachable; only this device was cleared.");
    }
    Ok(())
}

async fn cmd_stats(client: &Client) -> anyhow::Result<()> {
    let progress = &client.progress;
    let today = OffsetDateTime::now_utc().date();
    let lifetime = progress.lifetime();
    let goals = progress.daily_goals(today);
    let achievements = progress.achievements();

    println!("Streak: {} day(s)", progress.streak());
    println!(
        "Lifetime: {} quizzes, {} / {} correct, best streak {}",
        lifetime.total_quizzes,
        lifetime.total_correct,
        lifetime.total_answered,
        lifetime.best_streak
    );
    println!(
        "Today: answered {}/{GOAL_ANSWERED}, score {}/{GOAL_SCORE}, online sessions {}/{GOAL_ONLINE}",
        goals.answered, goals.score, goals.online
    );
    for (category, accuracy) in progress.subject_accuracy() {
        println!("  {:<8} {accuracy}%", category.display_name());
    }

    let flags = [
        ("First quiz", achievements.first_quiz),
        ("Perfect 10", achievements.perfect_ten),
        ("3-day streak", achievements.streak3),
        ("7-day streak", achievements.streak7),
        ("Speedster", achievements.speedster),
        ("Scholar 50", achievements.scholar50),
    ];
    let earned: Vec<&str> = flags
        .iter()
        .filter(|(_, earned)| *earned)
        .map(|(label, _)| *label)
        .collect();
    if earned.is_empty() {
        println!("Achievements: none yet");
    } else {
        println!("Achievements: {}", earned.join(", "));
    }

    let recent = progress.recent();
    if !recent.is_empty() {
        println!("Recent:");
        for entry in recent {
            println!(
                "  {} {} {} {}/{} in {}s",
                entry.subject, entry.mode, entry.difficulty, entry.score, entry.total, entry.secs
            );
        }
    }
    Ok(())
}
