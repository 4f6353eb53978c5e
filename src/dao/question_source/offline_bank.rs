//! Static per-category question bank used for offline practice. A user-supplied JSON file
//! can extend the built-in set; the bank is logically infinite because batches are drawn by
//! reshuffling the pool as many times as needed.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use rand::{Rng, rng, seq::SliceRandom};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::state::quiz::{Category, Question};

use super::{BatchRequest, QuestionSource, SourceResult};

type RawQuestion = (&'static str, &'static str, &'static [&'static str]);

const MATH: &[RawQuestion] = &[
    ("What is 7 x 8?", "56", &["54", "56", "64", "58"]),
    ("Square root of 81?", "9", &["8", "9", "7", "6"]),
    ("What is 12 + 15?", "27", &["26", "27", "28", "25"]),
    ("What is 5! ?", "120", &["60", "100", "120", "150"]),
];

const CS: &[RawQuestion] = &[
    (
        "What does CPU stand for?",
        "Central Processing Unit",
        &[
            "Central Process Unit",
            "Central Processing Unit",
            "Computer Personal Unit",
            "Central Power Unit",
        ],
    ),
    ("Binary of 5?", "101", &["110", "100", "101", "111"]),
    (
        "HTTP stands for?",
        "HyperText Transfer Protocol",
        &[
            "HyperText Transfer Protocol",
            "HighText Transfer Protocol",
            "HyperTransfer Text Protocol",
            "HyperText Transmission Protocol",
        ],
    ),
];

const SCIENCE: &[RawQuestion] = &[
    (
        "Which gas do plants absorb?",
        "Carbon Dioxide",
        &["Oxygen", "Carbon Dioxide", "Nitrogen", "Hydrogen"],
    ),
    ("Water chemical formula?", "H2O", &["H2O", "CO2", "O2", "NaCl"]),
    ("Human body has how many lungs?", "2", &["1", "2", "3", "4"]),
];

const HISTORY: &[RawQuestion] = &[
    (
        "Who was the first President of the USA?",
        "George Washington",
        &[
            "Abraham Lincoln",
            "Thomas Jefferson",
            "George Washington",
            "John Adams",
        ],
    ),
    (
        "The Great Wall is in which country?",
        "China",
        &["India", "China", "Japan", "Mongolia"],
    ),
    ("World War II ended in?", "1945", &["1939", "1942", "1945", "1948"]),
];

const GENERAL_FALLBACK: &[RawQuestion] = &[
    (
        "What is the capital of France?",
        "Paris",
        &["Paris", "Rome", "Berlin", "Madrid"],
    ),
    (
        "Who wrote 'Romeo and Juliet'?",
        "Shakespeare",
        &["Shakespeare", "Hemingway", "Dickens", "Twain"],
    ),
    (
        "Which planet is known as the Red Planet?",
        "Mars",
        &["Jupiter", "Venus", "Mars", "Mercury"],
    ),
];

/// Entry of an overlay bank file: `[{"q": ..., "a": ..., "opts": [...]}]`.
#[derive(Debug, Deserialize)]
struct BankEntry {
    q: String,
    a: String,
    #[serde(default)]
    opts: Vec<String>,
}

fn from_raw(raw: &[RawQuestion]) -> Vec<Question> {
    raw.iter()
        .filter_map(|(text, answer, options)| {
            Question::new(*text, *answer, options.iter().map(|option| option.to_string())).ok()
        })
        .collect()
}

fn builtin(category: &Category) -> Vec<Question> {
    match category.key() {
        "19" => from_raw(MATH),
        "18" => from_raw(CS),
        "17" => from_raw(SCIENCE),
        "23" => from_raw(HISTORY),
        _ => Vec::new(),
    }
}

/// Questions served when a category has nothing at all, so practice can always start.
pub fn general_fallback() -> Vec<Question> {
    from_raw(GENERAL_FALLBACK)
}

/// Build a batch of `count` questions by concatenating shuffled copies of `pool`.
pub fn draw_batch<R: Rng + ?Sized>(pool: &[Question], count: usize, rng: &mut R) -> Vec<Question> {
    let mut batch = Vec::with_capacity(count);
    if pool.is_empty() {
        return batch;
    }
    while batch.len() < count {
        let mut round = pool.to_vec();
        round.shuffle(rng);
        batch.extend(round);
    }
    batch.truncate(count);
    batch
}

/// Offline [`QuestionSource`] with an optional overlay directory and a per-category cache.
#[derive(Clone, Default)]
pub struct OfflineBank {
    overlay_dir: Option<PathBuf>,
    cache: Arc<DashMap<Category, Arc<Vec<Question>>>>,
}

impl OfflineBank {
    /// Bank limited to the built-in questions.
    pub fn builtin_only() -> Self {
        Self::default()
    }

    /// Bank that also reads `<dir>/<math|cs|science|history>.json`.
    pub fn with_overlay_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            overlay_dir: Some(dir.into()),
            cache: Arc::default(),
        }
    }

    /// Question pool for `category`: overlay first, then built-ins, else the general fallback.
    pub async fn pool(&self, category: &Category) -> Arc<Vec<Question>> {
        if let Some(cached) = self.cache.get(category) {
            return cached.clone();
        }

        let mut questions = match (&self.overlay_dir, category.bank_name()) {
            (Some(dir), Some(name)) => load_overlay(&dir.join(format!("{name}.json"))).await,
            _ => Vec::new(),
        };
        questions.extend(builtin(category));
        if questions.is_empty() {
            questions = general_fallback();
        }

        let pool = Arc::new(questions);
        self.cache.insert(category.clone(), pool.clone());
        pool
    }
}

async fn load_overlay(path: &Path) -> Vec<Question> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "offline bank load failed");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<BankEntry>>(&contents) {
        Ok(entries) => {
            let questions: Vec<Question> = entries
                .into_iter()
                .filter_map(|entry| Question::new(entry.q, entry.a, entry.opts).ok())
                .collect();
            debug!(path = %path.display(), count = questions.len(), "loaded offline bank overlay");
            questions
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "offline bank file is not a question list");
            Vec::new()
        }
    }
}

impl QuestionSource for OfflineBank {
    fn fetch(&self, request: BatchRequest) -> BoxFuture<'static, SourceResult<Vec<Question>>> {
        let bank = self.clone();
        Box::pin(async move {
            let pool = bank.pool(&request.category).await;
            let batch = draw_batch(&pool, request.count as usize, &mut rng());
            Ok(batch)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn request(category: &str, count: u32) -> BatchRequest {
        BatchRequest {
            category: Category::new(category),
            difficulty: None,
            count,
        }
    }

    #[test]
    fn every_known_category_has_builtin_questions() {
        for key in crate::state::quiz::KNOWN_CATEGORIES {
            assert!(!builtin(&Category::new(key)).is_empty(), "category {key}");
        }
    }

    #[test]
    fn batch_resamples_pool_to_reach_count() {
        let pool = from_raw(MATH);
        let mut rng = StdRng::seed_from_u64(3);

        let batch = draw_batch(&pool, 10, &mut rng);

        assert_eq!(batch.len(), 10);
        // Every full round contains each pool question once.
        for question in &pool {
            let seen = batch[..8].iter().filter(|q| *q == question).count();
            assert_eq!(seen, 2);
        }
    }

    #[test]
    fn empty_pool_yields_empty_batch() {
        assert!(draw_batch(&[], 5, &mut StdRng::seed_from_u64(1)).is_empty());
    }

    #[tokio::test]
    async fn unknown_category_uses_general_fallback() {
        let bank = OfflineBank::builtin_only();
        let batch = bank.fetch(request("9", 4)).await.unwrap();

        assert_eq!(batch.len(), 4);
        let fallback = general_fallback();
        assert!(batch.iter().all(|question| fallback.contains(question)));
    }

    #[tokio::test]
    async fn overlay_questions_come_before_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("history.json"),
            r#"[{"q": "Year of the Moon landing?", "a": "1969", "opts": ["1969", "1972"]}]"#,
        )
        .unwrap();
        let bank = OfflineBank::with_overlay_dir(dir.path());

        let pool = bank.pool(&Category::new("23")).await;

        assert_eq!(pool.len(), 1 + HISTORY.len());
        assert_eq!(pool[0].text(), "Year of the Moon landing?");
    }

    #[tokio::test]
    async fn malformed_overlay_falls_back_to_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("math.json"), "{}").unwrap();
        let bank = OfflineBank::with_overlay_dir(dir.path());

        let pool = bank.pool(&Category::new("19")).await;

        assert_eq!(pool.len(), MATH.len());
    }
}
