use super::*;
use crate::error::{GameError, GameResult};
use rand::Rng;
use std::sync::atomic::Ordering;

/// Room codes avoid characters that are easy to confuse when read aloud
const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> RoomCode {
    (0..CODE_LEN)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

impl AppState {
    /// Create a room whose human seat belongs to `session`. With
    /// `as_operator` the human is the liar.
    pub async fn create_room(
        &self,
        session: &SessionId,
        as_operator: bool,
    ) -> GameResult<RoomSnapshot> {
        let mut rooms = self.rooms.write().await;
        let mut rng = self.rng.lock().await;

        let code = loop {
            let candidate = generate_code(&mut *rng);
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
            tracing::debug!(code = %candidate, "Room code collision, regenerating");
        };

        let room = Room::new(code.clone(), session, as_operator, &self.config, &mut *rng)?;
        let snapshot = room.snapshot_for(Some(session));
        rooms.insert(code.clone(), Arc::new(RoomHandle::new(room)));

        tracing::info!(
            room = %code,
            as_operator,
            live_rooms = rooms.len(),
            "Room created"
        );
        Ok(snapshot)
    }

    /// Look up a live room. Codes are case-insensitive.
    pub async fn get_room(&self, code: &str) -> GameResult<Arc<RoomHandle>> {
        let code = code.trim().to_uppercase();
        self.rooms
            .read()
            .await
            .get(&code)
            .cloned()
            .ok_or(GameError::RoomNotFound(code))
    }

    /// Join an existing room. The session that owns the human seat gets its
    /// seat back; anyone else watches as an observer.
    pub async fn join_room(&self, code: &str, session: &SessionId) -> GameResult<RoomSnapshot> {
        let handle = self.get_room(code).await?;
        let mut room = handle.lock().await;
        room.touch();

        let snapshot = room.snapshot_for(Some(session));
        match &snapshot.viewer.seat_id {
            Some(seat_id) => tracing::info!(room = %handle.code, seat = %seat_id, "Seat re-attached"),
            None => tracing::info!(room = %handle.code, "Observer joined"),
        }
        Ok(snapshot)
    }

    /// Drop a room and tell everyone attached to it. Frees the code.
    pub async fn remove_room(&self, code: &str) -> GameResult<()> {
        let code = code.trim().to_uppercase();
        let handle = self
            .rooms
            .write()
            .await
            .remove(&code)
            .ok_or_else(|| GameError::RoomNotFound(code.clone()))?;

        let _ = handle.events.send(RoomEvent::Closed);
        tracing::info!(room = %code, "Room removed");
        Ok(())
    }

    /// Leave a room. When the seated human leaves, the room is torn down;
    /// observers leaving changes nothing.
    pub async fn leave_room(&self, code: &str, session: &SessionId) -> GameResult<()> {
        let handle = self.get_room(code).await?;
        let owns_seat = handle.lock().await.seat_of(session).is_some();

        if owns_seat {
            self.remove_room(&handle.code).await
        } else {
            tracing::debug!(room = %handle.code, "Observer left");
            Ok(())
        }
    }

    /// Record a connection subscribed to this room
    pub async fn attach(&self, handle: &RoomHandle) {
        let count = handle.connections.fetch_add(1, Ordering::SeqCst) + 1;
        handle.lock().await.touch();
        tracing::debug!(room = %handle.code, connections = count, "Connection attached");
    }

    pub async fn detach(&self, handle: &RoomHandle) {
        let count = handle
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)))
            .map(|prev| prev.saturating_sub(1))
            .unwrap_or(0);
        handle.lock().await.touch();
        tracing::debug!(room = %handle.code, connections = count, "Connection detached");
    }

    /// Remove rooms nobody has been connected to for longer than the idle
    /// TTL. Returns the removed codes.
    pub async fn reap_idle_rooms(&self) -> Vec<RoomCode> {
        let ttl = self.config.idle_room_ttl;
        let handles: Vec<Arc<RoomHandle>> = self.rooms.read().await.values().cloned().collect();

        let mut idle = Vec::new();
        for handle in handles {
            if handle.connections() > 0 {
                continue;
            }
            let room = handle.lock().await;
            if !room.is_busy() && room.idle_for() >= ttl {
                idle.push(handle.code.clone());
            }
        }

        for code in &idle {
            if self.remove_room(code).await.is_ok() {
                tracing::info!(room = %code, "Idle room reaped");
            }
        }
        idle
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    const SESSION: &str = "01J00000000000000000000000";

    fn session() -> SessionId {
        SESSION.to_string()
    }

    #[test]
    fn test_code_format() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_CHARS.contains(&b)));
        }
    }

    #[tokio::test]
    async fn test_create_and_get_room() {
        let state = AppState::offline();
        let snapshot = state.create_room(&session(), true).await.unwrap();

        assert_eq!(snapshot.code.len(), CODE_LEN);
        assert_eq!(snapshot.phase, Phase::Statement1);
        assert_eq!(snapshot.seats.len(), 6);
        assert!(state.get_room(&snapshot.code).await.is_ok());
        assert!(state
            .get_room(&snapshot.code.to_lowercase())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_codes_are_unique() {
        let state = AppState::offline();
        for _ in 0..50 {
            state.create_room(&session(), false).await.unwrap();
        }
        assert_eq!(state.room_count().await, 50);
    }

    #[tokio::test]
    async fn test_unknown_room() {
        let state = AppState::offline();
        assert_eq!(
            state.join_room("nope00", &session()).await.unwrap_err(),
            GameError::RoomNotFound("NOPE00".to_string())
        );
    }

    #[tokio::test]
    async fn test_rejoin_and_observe() {
        let state = AppState::offline();
        let created = state.create_room(&session(), false).await.unwrap();

        let rejoined = state.join_room(&created.code, &session()).await.unwrap();
        assert_eq!(rejoined.viewer.role, ViewerRole::Player);
        assert_eq!(rejoined.viewer.seat_id, created.viewer.seat_id);

        let observer = state
            .join_room(&created.code, &"01J11111111111111111111111".to_string())
            .await
            .unwrap();
        assert_eq!(observer.viewer.role, ViewerRole::Observer);
    }

    #[tokio::test]
    async fn test_leave_by_owner_removes_room() {
        let state = AppState::offline();
        let created = state.create_room(&session(), false).await.unwrap();
        let handle = state.get_room(&created.code).await.unwrap();
        let mut rx = handle.subscribe();

        state
            .leave_room(&created.code, &"01J11111111111111111111111".to_string())
            .await
            .unwrap();
        assert_eq!(state.room_count().await, 1);

        state.leave_room(&created.code, &session()).await.unwrap();
        assert_eq!(state.room_count().await, 0);
        assert!(matches!(rx.recv().await.unwrap(), RoomEvent::Closed));
        assert!(state.get_room(&created.code).await.is_err());
    }

    #[tokio::test]
    async fn test_reaper_skips_connected_rooms() {
        let config = GameConfig {
            idle_room_ttl: Duration::ZERO,
            ..GameConfig::default()
        };
        let state = AppState::new(config, LlmManager::offline(), LlmConfig::default());
        let kept = state.create_room(&session(), false).await.unwrap();
        let dropped = state.create_room(&session(), false).await.unwrap();

        let handle = state.get_room(&kept.code).await.unwrap();
        state.attach(&handle).await;

        let reaped = state.reap_idle_rooms().await;
        assert_eq!(reaped, vec![dropped.code]);
        assert!(state.get_room(&kept.code).await.is_ok());

        state.detach(&handle).await;
        assert_eq!(handle.connections(), 0);
        assert_eq!(state.reap_idle_rooms().await, vec![kept.code]);
    }
}
