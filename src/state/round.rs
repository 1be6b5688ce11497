use super::*;
use crate::error::{GameError, GameResult};
use crate::llm::GenerateRequest;

impl AppState {
    /// Submit free text for the caller's seat and run the round it triggers.
    ///
    /// The room is validated and marked busy under its lock, the lock is
    /// released for the generator call, and the round is committed or rolled
    /// back as a whole once the call returns.
    pub async fn submit_message(
        &self,
        code: &str,
        session: &SessionId,
        text: &str,
    ) -> GameResult<RoomSnapshot> {
        self.run_round(code, session, text, RoundKind::Turn).await
    }

    /// Operator interjection. Runs like a batch round in which every AI seat
    /// reacts, but leaves the turn and phase untouched.
    pub async fn operator_message(
        &self,
        code: &str,
        session: &SessionId,
        text: &str,
    ) -> GameResult<RoomSnapshot> {
        self.run_round(code, session, text, RoundKind::Intervention)
            .await
    }

    async fn run_round(
        &self,
        code: &str,
        session: &SessionId,
        text: &str,
        kind: RoundKind,
    ) -> GameResult<RoomSnapshot> {
        self.throttle.admit_submission(session).await?;
        let handle = self.get_room(code).await?;

        let plan = {
            let mut room = handle.lock().await;
            let plan = match kind {
                RoundKind::Turn => room.begin_round(session, text),
                RoundKind::Intervention => room.begin_intervention(session, text),
            }
            .inspect_err(|e| {
                tracing::warn!(room = %handle.code, ?kind, error = %e, "Submission rejected");
            })?;
            room.touch();

            if !plan.needs_generation() {
                let ticket = plan.ticket.clone();
                let mut rng = self.rng.lock().await;
                if let Err(e) = room.commit_round(plan, Vec::new(), &mut *rng) {
                    room.abort_round(&ticket);
                    return Err(e);
                }
                handle.publish(&room);
                return Ok(room.snapshot_for(Some(session)));
            }

            // Everyone sees the room go busy
            handle.publish(&room);
            plan
        };

        // Run to completion even if the caller goes away, so the room
        // never stays busy
        let state = self.clone();
        let session = session.clone();
        tokio::spawn(async move { state.finish_round(handle, plan, session).await })
            .await
            .map_err(|e| GameError::UpstreamGeneration(e.to_string()))?
    }

    async fn finish_round(
        &self,
        handle: Arc<RoomHandle>,
        plan: RoundPlan,
        session: SessionId,
    ) -> GameResult<RoomSnapshot> {
        let requests: Vec<GenerateRequest> = plan
            .contexts
            .iter()
            .cloned()
            .map(|ctx| GenerateRequest::for_speaker(ctx, &self.llm_config))
            .collect();

        let timeout = self.config.generation_timeout;
        let generated =
            match tokio::time::timeout(timeout, self.llm.generate_batch(requests)).await {
                Ok(Ok(texts)) => Ok(texts),
                Ok(Err(e)) => Err(GameError::from(e)),
                Err(_) => Err(GameError::UpstreamGeneration(format!(
                    "generation timed out after {:?}",
                    timeout
                ))),
            };

        let mut room = handle.lock().await;
        let ticket = plan.ticket.clone();
        let result = match generated {
            Ok(texts) => {
                let mut rng = self.rng.lock().await;
                room.commit_round(plan, texts, &mut *rng)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                room.touch();
                handle.publish(&room);
                Ok(room.snapshot_for(Some(&session)))
            }
            Err(e) => {
                room.abort_round(&ticket);
                tracing::warn!(room = %handle.code, error = %e, "Round rolled back");
                handle.publish(&room);
                handle.notify(e.code(), format!("{}. Nothing was posted, please try again.", e));
                Err(e)
            }
        }
    }

    /// Reveal the counterpart's staged line in a turn-gated phase
    pub async fn reveal_counterpart(
        &self,
        code: &str,
        session: &SessionId,
    ) -> GameResult<RoomSnapshot> {
        let handle = self.get_room(code).await?;
        let mut room = handle.lock().await;
        room.reveal_counterpart(session)?;
        room.touch();
        handle.publish(&room);
        Ok(room.snapshot_for(Some(session)))
    }

    pub async fn cast_vote(
        &self,
        code: &str,
        session: &SessionId,
        suspected_seat_id: &str,
    ) -> GameResult<VoteResult> {
        let handle = self.get_room(code).await?;
        let mut room = handle.lock().await;
        let result = room.cast_vote(session, suspected_seat_id).inspect_err(|e| {
            tracing::warn!(room = %handle.code, error = %e, "Vote rejected");
        })?;
        room.touch();
        handle.publish(&room);
        Ok(result)
    }

    /// Start the next game in an ended room
    pub async fn reset_room(&self, code: &str, session: &SessionId) -> GameResult<RoomSnapshot> {
        let handle = self.get_room(code).await?;
        let mut room = handle.lock().await;
        {
            let mut rng = self.rng.lock().await;
            room.reset(session, &mut *rng)?;
        }
        room.touch();
        handle.publish(&room);
        Ok(room.snapshot_for(Some(session)))
    }

    /// Current view of a room for this session
    pub async fn snapshot(&self, code: &str, session: Option<&str>) -> GameResult<RoomSnapshot> {
        let handle = self.get_room(code).await?;
        let room = handle.lock().await;
        Ok(room.snapshot_for(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = "01J00000000000000000000000";

    #[tokio::test]
    async fn test_offline_round_advances() {
        let state = AppState::offline();
        let session = SESSION.to_string();
        let created = state.create_room(&session, true).await.unwrap();

        let after = state
            .submit_message(&created.code, &session, "I use it every morning")
            .await
            .unwrap();
        assert_eq!(after.phase, Phase::Discussion1);
        assert_eq!(after.transcript.len(), 6);
        assert!(!after.busy);
    }

    #[tokio::test]
    async fn test_rejection_changes_nothing() {
        let state = AppState::offline();
        let session = SESSION.to_string();
        let created = state.create_room(&session, false).await.unwrap();

        let err = state
            .submit_message(&created.code, &session, "  ")
            .await
            .unwrap_err();
        assert_eq!(err, GameError::EmptyInput);

        let snapshot = state.snapshot(&created.code, Some(SESSION)).await.unwrap();
        assert_eq!(snapshot.version, created.version);
        assert!(snapshot.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_operator_message_keeps_phase() {
        let state = AppState::offline();
        let session = SESSION.to_string();
        let created = state.create_room(&session, true).await.unwrap();

        let after = state
            .operator_message(&created.code, &session, "Keep it short, everyone")
            .await
            .unwrap();
        assert_eq!(after.phase, Phase::Statement1);
        assert_eq!(after.turn, created.turn);
        assert_eq!(after.transcript.len(), 6);
        assert_eq!(after.transcript[0].role, SenderRole::Operator);
    }

    #[tokio::test]
    async fn test_submissions_are_throttled_per_session() {
        let throttle = crate::throttle::Throttle {
            frames: None,
            submissions: Some(crate::throttle::SessionBudget::new(
                1,
                std::time::Duration::from_secs(60),
            )),
        };
        let state = AppState::offline().with_throttle(throttle);
        let session = SESSION.to_string();
        let created = state.create_room(&session, true).await.unwrap();

        state
            .submit_message(&created.code, &session, "first")
            .await
            .unwrap();
        let err = state
            .submit_message(&created.code, &session, "second")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::RateLimited(_)));

        let snapshot = state.snapshot(&created.code, Some(SESSION)).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Discussion1);
        assert_eq!(snapshot.transcript.len(), 6);
    }

    #[tokio::test]
    async fn test_vote_before_vote_phase() {
        let state = AppState::offline();
        let session = SESSION.to_string();
        let created = state.create_room(&session, false).await.unwrap();
        let seat = created.seats[0].id.clone();

        assert_eq!(
            state
                .cast_vote(&created.code, &session, &seat)
                .await
                .unwrap_err(),
            GameError::VoteNotOpen(Phase::Statement1)
        );
    }
}
