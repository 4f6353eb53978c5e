pub mod health;
pub mod leaderboard;
pub mod presence;
pub mod validation;
