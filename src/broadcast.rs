use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// How often idle rooms and quiet throttle sessions are swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a background task that removes rooms nobody has been connected to
/// for longer than the idle TTL, and forgets quiet throttle sessions
pub fn spawn_idle_room_reaper(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            let reaped = state.reap_idle_rooms().await;
            if !reaped.is_empty() {
                let live_rooms = state.room_count().await;
                tracing::info!(count = reaped.len(), live_rooms, "Reaped idle rooms");
            }

            state.throttle.sweep().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmConfig, LlmManager};
    use crate::throttle::{SessionBudget, Throttle};
    use crate::types::GameConfig;

    #[tokio::test]
    async fn test_reaper_removes_idle_rooms() {
        let config = GameConfig {
            idle_room_ttl: Duration::ZERO,
            ..GameConfig::default()
        };
        let state = Arc::new(AppState::new(
            config,
            LlmManager::offline(),
            LlmConfig::default(),
        ));
        state
            .create_room(&"01J00000000000000000000000".to_string(), false)
            .await
            .unwrap();

        spawn_idle_room_reaper(state.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_reaper_forgets_quiet_sessions() {
        let budget = SessionBudget::new(5, Duration::from_millis(20));
        let throttle = Throttle {
            frames: Some(budget.clone()),
            submissions: None,
        };
        let state = Arc::new(AppState::offline().with_throttle(throttle));
        state.throttle.admit_frame("01J00000000000000000000000").await.unwrap();
        assert_eq!(budget.tracked_sessions().await, 1);

        spawn_idle_room_reaper(state.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(budget.tracked_sessions().await, 0);
    }
}
