pub mod merge;
mod registry;
pub mod room;
mod round;
pub mod seats;
pub mod snapshot;
pub mod topics;

pub use room::{Room, RoundKind, RoundPlan};
pub use snapshot::{RoomSnapshot, SeatView, ViewerInfo, ViewerRole};

use crate::llm::{LlmConfig, LlmManager};
use crate::throttle::Throttle;
use crate::types::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Events fanned out to every connection attached to a room
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// The room changed; each connection renders its own snapshot from it
    Changed(Arc<Room>),
    /// Room-wide system notice, e.g. a failed generation round
    Notice { code: String, msg: String },
    Closed,
}

/// A live room plus its fan-out channel
pub struct RoomHandle {
    pub code: RoomCode,
    pub(crate) room: Mutex<Room>,
    events: broadcast::Sender<RoomEvent>,
    connections: AtomicUsize,
}

impl RoomHandle {
    fn new(room: Room) -> Self {
        let (events, _rx) = broadcast::channel(100);
        Self {
            code: room.code().to_string(),
            room: Mutex::new(room),
            events,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Lock the room state. Mutations belong in `AppState` so that every
    /// change is also broadcast.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Room> {
        self.room.lock().await
    }

    /// Broadcast the current state. Called with the room lock held so all
    /// subscribers see changes in commit order.
    pub(crate) fn publish(&self, room: &Room) {
        // No subscribers is fine
        let _ = self.events.send(RoomEvent::Changed(Arc::new(room.clone())));
    }

    pub(crate) fn notify(&self, code: &str, msg: impl Into<String>) {
        let _ = self.events.send(RoomEvent::Notice {
            code: code.to_string(),
            msg: msg.into(),
        });
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomCode, Arc<RoomHandle>>>>,
    pub config: GameConfig,
    pub llm: Arc<LlmManager>,
    pub llm_config: LlmConfig,
    /// Per-session budgets; unlimited unless set with `with_throttle`
    pub throttle: Arc<Throttle>,
    rng: Arc<Mutex<StdRng>>,
}

impl AppState {
    pub fn new(config: GameConfig, llm: LlmManager, llm_config: LlmConfig) -> Self {
        Self::with_rng(config, llm, llm_config, StdRng::from_os_rng())
    }

    /// Deterministic shuffles and seating, for tests
    pub fn with_seed(config: GameConfig, llm: LlmManager, llm_config: LlmConfig, seed: u64) -> Self {
        Self::with_rng(config, llm, llm_config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, llm: LlmManager, llm_config: LlmConfig, rng: StdRng) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            config,
            llm: Arc::new(llm),
            llm_config,
            throttle: Arc::new(Throttle::default()),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = Arc::new(throttle);
        self
    }

    /// Offline state with default config and the template provider
    pub fn offline() -> Self {
        Self::new(
            GameConfig::default(),
            LlmManager::offline(),
            LlmConfig::default(),
        )
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::offline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let state = AppState::offline();
        let session = "01J00000000000000000000000".to_string();
        let snapshot = state.create_room(&session, false).await.unwrap();

        let handle = state.get_room(&snapshot.code).await.unwrap();
        let mut rx = handle.subscribe();

        {
            let room = handle.lock().await;
            handle.publish(&room);
        }

        match rx.recv().await.unwrap() {
            RoomEvent::Changed(room) => assert_eq!(room.code(), snapshot.code),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_seeded_states_seat_identically() {
        let session = "01J00000000000000000000000".to_string();
        let a = AppState::with_seed(
            GameConfig::default(),
            LlmManager::offline(),
            LlmConfig::default(),
            3,
        );
        let b = AppState::with_seed(
            GameConfig::default(),
            LlmManager::offline(),
            LlmConfig::default(),
            3,
        );

        let sa = a.create_room(&session, true).await.unwrap();
        let sb = b.create_room(&session, true).await.unwrap();
        assert_eq!(sa.code, sb.code);
        assert_eq!(sa.category, sb.category);

        let names = |s: &RoomSnapshot| {
            s.seats
                .iter()
                .map(|seat| seat.display_name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&sa), names(&sb));
    }
}
