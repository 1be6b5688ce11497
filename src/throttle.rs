//! Per-session throttling.
//!
//! Every accepted submission costs one generator call per AI seat, so the
//! budget that matters is per session, not per connection: a client that
//! reconnects with the same session keeps its history. Two budgets exist,
//! one for raw WebSocket frames and one for submissions that can start a
//! round. Both use a sliding window log.

use crate::error::{GameError, GameResult};
use crate::types::SessionId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Sliding window budget keyed by session
#[derive(Debug, Clone)]
pub struct SessionBudget {
    hits: Arc<Mutex<HashMap<SessionId, VecDeque<Instant>>>>,
    limit: usize,
    window: Duration,
}

impl SessionBudget {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            hits: Arc::new(Mutex::new(HashMap::new())),
            limit,
            window,
        }
    }

    /// Record one hit for `session`. On refusal, returns how long until the
    /// oldest hit leaves the window; refused hits are not recorded.
    pub async fn admit(&self, session: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let log = hits.entry(session.to_string()).or_default();

        while log
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            log.pop_front();
        }

        if log.len() >= self.limit {
            let oldest = log.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }

        log.push_back(now);
        Ok(())
    }

    /// Forget sessions whose every hit has left the window
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        hits.retain(|_, log| {
            log.back()
                .is_some_and(|t| now.duration_since(*t) < self.window)
        });
    }

    pub async fn tracked_sessions(&self) -> usize {
        self.hits.lock().await.len()
    }
}

/// Budgets applied to every session. `None` disables a budget.
#[derive(Debug, Clone, Default)]
pub struct Throttle {
    /// Client frames of any kind
    pub frames: Option<SessionBudget>,
    /// `submit_message` and `operator_message` requests
    pub submissions: Option<SessionBudget>,
}

fn budget_from_env(limit_var: &str, window_var: &str, limit: usize, window_secs: u64) -> Option<SessionBudget> {
    let limit = std::env::var(limit_var)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(limit);
    // A limit of zero turns the budget off
    if limit == 0 {
        return None;
    }
    let window_secs = std::env::var(window_var)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(window_secs);
    Some(SessionBudget::new(limit, Duration::from_secs(window_secs)))
}

impl Throttle {
    /// Load budgets from the environment. Defaults are 30 frames per 10 s and
    /// 12 submissions per 60 s.
    pub fn from_env() -> Self {
        let throttle = Self {
            frames: budget_from_env("LIAR_FRAME_LIMIT", "LIAR_FRAME_WINDOW_SECS", 30, 10),
            submissions: budget_from_env(
                "LIAR_SUBMISSION_LIMIT",
                "LIAR_SUBMISSION_WINDOW_SECS",
                12,
                60,
            ),
        };
        tracing::info!(
            frames = ?throttle.frames.as_ref().map(|b| (b.limit, b.window)),
            submissions = ?throttle.submissions.as_ref().map(|b| (b.limit, b.window)),
            "Throttle config loaded"
        );
        throttle
    }

    pub async fn admit_frame(&self, session: &str) -> GameResult<()> {
        check(&self.frames, session).await
    }

    pub async fn admit_submission(&self, session: &str) -> GameResult<()> {
        check(&self.submissions, session).await
    }

    pub async fn sweep(&self) {
        for budget in [&self.frames, &self.submissions].into_iter().flatten() {
            budget.sweep().await;
        }
    }
}

async fn check(budget: &Option<SessionBudget>, session: &str) -> GameResult<()> {
    let Some(budget) = budget else {
        return Ok(());
    };
    budget.admit(session).await.map_err(|wait| {
        tracing::warn!(session, ?wait, "Session throttled");
        GameError::RateLimited(wait.as_secs().max(1))
    })
}
