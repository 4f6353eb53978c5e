use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, interval_at},
};

/// Countdown resolution.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// One-second tick emitted by an armed [`QuestionTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    /// Arm generation the tick belongs to.
    pub generation: u64,
}

/// Recurring per-question tick source. At most one ticker task is live: arming cancels the
/// previous one, and ticks that were already queued are recognised by their generation.
pub struct QuestionTimer {
    tx: mpsc::UnboundedSender<TimerTick>,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl QuestionTimer {
    /// Timer delivering ticks to `tx`.
    pub fn new(tx: mpsc::UnboundedSender<TimerTick>) -> Self {
        Self {
            tx,
            handle: None,
            generation: 0,
        }
    }

    /// Cancel any running countdown and start a new one. Returns the new generation.
    pub fn arm(&mut self) -> u64 {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let tx = self.tx.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            loop {
                ticker.tick().await;
                if tx.send(TimerTick { generation }).is_err() {
                    break;
                }
            }
        }));
        generation
    }

    /// Stop the running countdown, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a countdown is running.
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// True when `tick` comes from the countdown currently armed.
    pub fn is_current(&self, tick: TimerTick) -> bool {
        self.is_armed() && tick.generation == self.generation
    }
}

impl Drop for QuestionTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
