//! Mission session controller.
//!
//! Owns the lifecycle of a dungeon run: start, per-event advancement,
//! party health bookkeeping, completion/failure/abandonment, expiry, and
//! cleanup. Every mutating operation loads the session under its lock,
//! works on the aggregates, and saves them back before releasing.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use delve_domain::{
    progression, ActionKind, CharacterId, DomainError, DungeonEvent, DungeonSession, EngineEvent,
    LootMode, MissionId, MissionTemplate, PartyMember, SessionId, SessionStatus,
};

use crate::infrastructure::locks::SessionLocks;
use crate::infrastructure::ports::{
    CharacterRepo, ClockPort, EventRepo, LootRepo, MissionRepo, PublisherPort, RepoError,
    SessionRepo,
};
use crate::use_cases::event::{EventError, EventOps};
use crate::use_cases::loot::{LootError, LootUseCases};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,
    #[error("Mission not found")]
    MissionNotFound,
    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Loot(#[from] LootError),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

pub struct SessionUseCases {
    sessions: Arc<dyn SessionRepo>,
    events: Arc<dyn EventRepo>,
    missions: Arc<dyn MissionRepo>,
    characters: Arc<dyn CharacterRepo>,
    loot_repo: Arc<dyn LootRepo>,
    publisher: Arc<dyn PublisherPort>,
    clock: Arc<dyn ClockPort>,
    locks: Arc<SessionLocks>,
    event_ops: EventOps,
    loot: Arc<LootUseCases>,
    /// Serializes `start` calls: the duplicate-party check and the first
    /// save must not interleave with another start.
    start_gate: tokio::sync::Mutex<()>,
}

impl SessionUseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionRepo>,
        events: Arc<dyn EventRepo>,
        missions: Arc<dyn MissionRepo>,
        characters: Arc<dyn CharacterRepo>,
        loot_repo: Arc<dyn LootRepo>,
        publisher: Arc<dyn PublisherPort>,
        clock: Arc<dyn ClockPort>,
        locks: Arc<SessionLocks>,
        event_ops: EventOps,
        loot: Arc<LootUseCases>,
    ) -> Self {
        Self {
            sessions,
            events,
            missions,
            characters,
            loot_repo,
            publisher,
            clock,
            locks,
            event_ops,
            loot,
            start_gate: tokio::sync::Mutex::new(()),
        }
    }

    // =========================================================================
    // Start
    // =========================================================================

    /// Begin a mission run for a party (or solo character). Fails when any
    /// character is already committed to another active session.
    pub async fn start(
        &self,
        character_ids: &[CharacterId],
        mission_id: MissionId,
        loot_mode: LootMode,
        master_looter: Option<CharacterId>,
        time_limit_override_ms: Option<i64>,
    ) -> Result<DungeonSession, SessionError> {
        if character_ids.is_empty() {
            return Err(DomainError::validation("party cannot be empty").into());
        }
        let mission = self
            .missions
            .get_mission(mission_id)
            .await?
            .ok_or(SessionError::MissionNotFound)?;

        let _gate = self.start_gate.lock().await;
        let mut party = Vec::with_capacity(character_ids.len());
        for (order, &character_id) in character_ids.iter().enumerate() {
            if let Some(existing) = self
                .sessions
                .find_active_for_character(character_id)
                .await?
            {
                tracing::debug!(%character_id, %existing, "character already in a session");
                return Err(DomainError::AlreadyActive(character_id.to_string()).into());
            }
            let profile = self
                .characters
                .get_profile(character_id)
                .await?
                .ok_or(SessionError::CharacterNotFound(character_id))?;
            // Health sync: every run starts at full health.
            party.push(PartyMember::new(
                character_id,
                order as u32,
                profile.max_health,
                profile.attack,
                profile.defense,
            ));
        }

        let now = self.clock.now();
        let time_limit = time_limit_override_ms.unwrap_or(mission.time_limit_ms());
        let mut session = DungeonSession::new(
            mission.id(),
            party,
            loot_mode,
            master_looter,
            now,
            time_limit,
        )?;

        let _guard = self.locks.acquire(session.id()).await;
        self.publisher.publish(EngineEvent::SessionStarted {
            session_id: session.id(),
            party: character_ids.to_vec(),
        });
        self.advance_locked(&mut session, &mission, now).await?;
        self.sessions.save(&session).await?;
        tracing::info!(session_id = %session.id(), mission = %mission.name(), "session started");
        Ok(session)
    }

    // =========================================================================
    // Action submission
    // =========================================================================

    /// Submit one player's action against the session's current event.
    pub async fn submit_action(
        &self,
        session_id: SessionId,
        character_id: CharacterId,
        kind: ActionKind,
    ) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(SessionError::NotFound)?;
        if session.status() != SessionStatus::Active {
            return Err(DomainError::invalid_state("session is not active").into());
        }
        let event_id = session
            .current_event_id()
            .ok_or_else(|| DomainError::invalid_state("session has no active event"))?;
        let mut event = self
            .events
            .get(event_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        let now = self.clock.now();
        self.event_ops
            .submit(&mut session, &mut event, character_id, kind, now)?;
        self.settle_event(&mut session, &mut event, now).await?;
        Ok(())
    }

    // =========================================================================
    // Advancement
    // =========================================================================

    /// Advance a session whose current event has resolved with no child.
    pub async fn advance(&self, session_id: SessionId) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(SessionError::NotFound)?;
        if session.status() != SessionStatus::Active {
            return Err(DomainError::invalid_state("session is not active").into());
        }
        if session.current_event_id().is_some() {
            return Err(DomainError::invalid_state("current event is still active").into());
        }
        let mission = self
            .missions
            .get_mission(session.mission_id())
            .await?
            .ok_or(SessionError::MissionNotFound)?;
        self.advance_locked(&mut session, &mission, self.clock.now())
            .await?;
        self.sessions.save(&session).await?;
        Ok(())
    }

    /// Select, create, and activate the next event, or close the session
    /// when the mission has nothing left to offer. Caller holds the lock
    /// and saves the session.
    async fn advance_locked(
        &self,
        session: &mut DungeonSession,
        mission: &MissionTemplate,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if session.status() != SessionStatus::Active {
            return Ok(());
        }
        if session.all_members_dead() {
            return self.fail_locked(session, now).await;
        }
        if session.stats().events_resolved >= mission.event_budget() {
            return self.complete_locked(session, now).await;
        }

        let draw = |total: u64| self.event_ops.draw(total);
        let template_id =
            match delve_domain::select_next(mission, session.used_templates(), draw) {
                Ok(id) => id,
                Err(DomainError::Configuration(reason)) => {
                    // No eligible templates left: the run is over, not stuck.
                    tracing::debug!(session_id = %session.id(), %reason, "event pool exhausted");
                    return self.complete_locked(session, now).await;
                }
                Err(other) => return Err(other.into()),
            };

        let template = match self.missions.get_event_template(template_id).await? {
            Some(t) => t,
            None => {
                tracing::warn!(
                    session_id = %session.id(),
                    %template_id,
                    "mission references unknown event template; closing session"
                );
                return self.complete_locked(session, now).await;
            }
        };

        let event = self
            .event_ops
            .activate_from_template(session, &template, now)
            .await?;
        self.events.save(&event).await?;
        Ok(())
    }

    /// Persist a resolution's side effects and move the session forward.
    /// No-op while the event stays active.
    async fn settle_event(
        &self,
        session: &mut DungeonSession,
        event: &mut DungeonEvent,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let mission = self
            .missions
            .get_mission(session.mission_id())
            .await?
            .ok_or(SessionError::MissionNotFound)?;

        if let Some(outcome) = self.event_ops.try_resolve(session, event, now).await? {
            session.record_xp(mission.tier().xp_per_event());
            for drop in &outcome.loot {
                self.loot_repo.save(drop).await?;
            }
            self.events.save(event).await?;
            if session.all_members_dead() {
                self.fail_locked(session, now).await?;
            } else {
                self.advance_locked(session, &mission, now).await?;
            }
        } else {
            self.events.save(event).await?;
        }
        self.sessions.save(session).await?;
        Ok(())
    }

    // =========================================================================
    // Terminal transitions
    // =========================================================================

    /// Abandon an active run on a party member's request.
    pub async fn abandon(
        &self,
        session_id: SessionId,
        by: CharacterId,
    ) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(SessionError::NotFound)?;
        if !session.has_member(by) {
            return Err(DomainError::not_found("PartyMember", by).into());
        }
        session.abandon(self.clock.now())?;
        self.sessions.save(&session).await?;
        self.publisher.publish(EngineEvent::SessionAbandoned {
            session_id,
            by,
        });
        tracing::info!(%session_id, %by, "session abandoned");
        Ok(())
    }

    /// Scheduler entry point: fail an active session whose deadline has
    /// passed. A call on an already-terminal session is a no-op.
    pub async fn check_expiry(&self, session_id: SessionId) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        let Some(mut session) = self.sessions.get(session_id).await? else {
            return Ok(());
        };
        if session.status() != SessionStatus::Active {
            return Ok(());
        }
        let now = self.clock.now();
        if !session.is_past_deadline(now) {
            return Ok(());
        }
        // Time ran out: the in-flight event is abandoned in place by the
        // terminal transition.
        self.fail_locked(&mut session, now).await?;
        self.sessions.save(&session).await?;
        tracing::info!(%session_id, "session expired");
        Ok(())
    }

    async fn complete_locked(
        &self,
        session: &mut DungeonSession,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        session.complete(now)?;
        self.publisher.publish(EngineEvent::SessionCompleted {
            session_id: session.id(),
            stats: *session.stats(),
        });
        self.loot.distribute(session).await?;
        self.grant_experience(session).await?;
        Ok(())
    }

    async fn fail_locked(
        &self,
        session: &mut DungeonSession,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        session.fail(now)?;
        self.publisher.publish(EngineEvent::SessionFailed {
            session_id: session.id(),
        });
        Ok(())
    }

    /// Grant the run's accrued experience to every surviving member and
    /// announce level-ups.
    async fn grant_experience(&self, session: &DungeonSession) -> Result<(), SessionError> {
        let amount = session.stats().xp_awarded;
        if amount == 0 {
            return Ok(());
        }
        for member in session.living_members() {
            let total = self
                .characters
                .add_experience(member.character_id(), amount)
                .await?;
            let before = progression::level_for_xp(total.saturating_sub(amount));
            let after = progression::level_for_xp(total);
            if after > before {
                self.publisher.publish(EngineEvent::LevelUp {
                    character_id: member.character_id(),
                    level: after,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Run one combat/timeout tick across every active session. Failures
    /// are isolated per session.
    pub async fn tick_all(&self) {
        let session_ids = match self.sessions.list_active().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("tick: failed to list active sessions: {e}");
                return;
            }
        };
        for session_id in session_ids {
            if let Err(e) = self.tick_session(session_id).await {
                tracing::error!(%session_id, "tick failed: {e}");
            }
        }
    }

    /// Apply due monster attacks and timeout collapses for one session.
    pub async fn tick_session(&self, session_id: SessionId) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        let Some(mut session) = self.sessions.get(session_id).await? else {
            return Ok(());
        };
        if session.status() != SessionStatus::Active {
            return Ok(());
        }
        let Some(event_id) = session.current_event_id() else {
            return Ok(());
        };
        let mut event = self
            .events
            .get(event_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        let now = self.clock.now();
        if event.kind().is_combat() {
            self.event_ops
                .apply_due_attacks(&mut session, &mut event, now)?;
        }
        self.settle_event(&mut session, &mut event, now).await?;
        Ok(())
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Delete one terminal session and everything hanging off it. Never
    /// touches an active session.
    pub async fn cleanup_session(&self, session_id: SessionId) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(session_id).await;
        let Some(session) = self.sessions.get(session_id).await? else {
            return Ok(());
        };
        if !session.status().is_terminal() {
            return Ok(());
        }
        self.events.delete_for_session(session_id).await?;
        self.loot_repo.delete_for_session(session_id).await?;
        self.sessions.delete(session_id).await?;
        tracing::debug!(%session_id, "session cleaned up");
        Ok(())
    }

    /// Release a deleted session's lock entry (called after cleanup).
    pub fn forget_lock(&self, session_id: SessionId) {
        self.locks.release(session_id);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use delve_domain::{
        ActorId, DifficultyTier, EventKind, EventPayload, EventTemplate, ItemId, LootEntry,
        LootTable, MonsterTemplate, MonsterTemplateId, SpawnRules, WeightedEntry,
    };

    use crate::infrastructure::clock::{FixedClock, FixedRandom};
    use crate::infrastructure::memory::{
        InMemoryCharacterRepo, InMemoryEventRepo, InMemoryLootRepo, InMemoryMissionRepo,
        InMemorySessionRepo,
    };
    use crate::infrastructure::ports::{CombatantProfile, RandomPort};
    use crate::infrastructure::publisher::RecordingPublisher;
    use crate::infrastructure::settings::EngineSettings;
    use crate::infrastructure::spawner::RosterSpawner;

    struct Harness {
        sessions: Arc<InMemorySessionRepo>,
        events: Arc<InMemoryEventRepo>,
        loot: Arc<InMemoryLootRepo>,
        missions: Arc<InMemoryMissionRepo>,
        characters: Arc<InMemoryCharacterRepo>,
        publisher: Arc<RecordingPublisher>,
        clock: FixedClock,
        uc: Arc<SessionUseCases>,
    }

    /// Full wiring over in-memory adapters. `FixedRandom(0)` makes every
    /// draw deterministic: selection hits the first eligible bucket, spawn
    /// counts sit at their minimum, percent rolls come up 1, stagger is 0.
    fn harness() -> Harness {
        let sessions = Arc::new(InMemorySessionRepo::new());
        let events = Arc::new(InMemoryEventRepo::new());
        let loot = Arc::new(InMemoryLootRepo::new());
        let missions = Arc::new(InMemoryMissionRepo::new());
        let characters = Arc::new(InMemoryCharacterRepo::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let clock = FixedClock::at(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let random: Arc<dyn RandomPort> = Arc::new(FixedRandom(0));
        let settings = EngineSettings::default();
        let locks = Arc::new(SessionLocks::new());

        let event_ops = EventOps::new(
            missions.clone(),
            Arc::new(RosterSpawner::new(random.clone(), 0)),
            publisher.clone(),
            random.clone(),
            settings.clone(),
        );
        let loot_uc = Arc::new(LootUseCases::new(
            loot.clone(),
            sessions.clone(),
            characters.clone(),
            publisher.clone(),
            Arc::new(clock.clone()),
            random.clone(),
            locks.clone(),
            settings.clone(),
        ));
        let uc = Arc::new(SessionUseCases::new(
            sessions.clone(),
            events.clone(),
            missions.clone(),
            characters.clone(),
            loot.clone(),
            publisher.clone(),
            Arc::new(clock.clone()),
            locks,
            event_ops,
            loot_uc,
        ));
        Harness {
            sessions,
            events,
            loot,
            missions,
            characters,
            publisher,
            clock,
            uc,
        }
    }

    impl Harness {
        fn add_character(&self, max_health: u32, attack: u32, defense: u32) -> CharacterId {
            let id = CharacterId::new();
            self.characters.insert_profile(
                id,
                CombatantProfile {
                    max_health,
                    attack,
                    defense,
                },
            );
            id
        }

        /// Register templates and a mission drawing uniformly over them.
        fn add_mission(
            &self,
            templates: Vec<EventTemplate>,
            tier: DifficultyTier,
            budget: u32,
        ) -> MissionId {
            let entries = templates
                .iter()
                .map(|t| WeightedEntry {
                    template_id: t.id(),
                    weight: 1,
                })
                .collect();
            for template in templates {
                self.missions.insert_template(template);
            }
            let mission = MissionTemplate::new("test run", entries, tier, 600_000, budget)
                .expect("mission");
            let id = mission.id();
            self.missions.insert_mission(mission);
            id
        }

        async fn current_event(&self, session_id: SessionId) -> DungeonEvent {
            let session = self.sessions.get(session_id).await.unwrap().unwrap();
            let event_id = session.current_event_id().expect("current event");
            self.events.get(event_id).await.unwrap().expect("event")
        }

        async fn session(&self, session_id: SessionId) -> DungeonSession {
            self.sessions.get(session_id).await.unwrap().expect("session")
        }
    }

    fn monster(health: u32, attack: u32) -> MonsterTemplate {
        MonsterTemplate {
            id: MonsterTemplateId::new(),
            name: "Gnasher".into(),
            health,
            attack,
            defense: 0,
            attack_speed: 1.0,
        }
    }

    fn single_spawn(m: MonsterTemplate) -> SpawnRules {
        SpawnRules {
            monsters: vec![m],
            min_count: 1,
            max_count: 1,
            elite_chance: 0,
            rare_chance: 0,
        }
    }

    fn combat(health: u32, attack: u32, loot: LootTable) -> EventTemplate {
        EventTemplate::new(
            "skirmish",
            EventPayload::Combat {
                spawn: single_spawn(monster(health, attack)),
                loot,
            },
        )
    }

    fn sole_actor(event: &DungeonEvent) -> ActorId {
        assert_eq!(event.actors().len(), 1);
        event.actors()[0].id
    }

    #[tokio::test]
    async fn start_activates_the_first_event() {
        let h = harness();
        let hero = h.add_character(30, 5, 0);
        let mission = h.add_mission(
            vec![combat(10, 5, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );

        let session = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Active);

        let event = h.current_event(session.id()).await;
        assert_eq!(event.actors().len(), 1);
        assert_eq!(event.actors()[0].current_health, 10);

        let published = h.publisher.drain();
        assert!(published
            .iter()
            .any(|e| matches!(e, EngineEvent::SessionStarted { .. })));
        assert!(published
            .iter()
            .any(|e| matches!(e, EngineEvent::EventActivated { sequence: 0, .. })));
    }

    #[tokio::test]
    async fn start_rejects_a_character_already_in_a_run() {
        let h = harness();
        let hero = h.add_character(30, 5, 0);
        let mission = h.add_mission(
            vec![combat(50, 5, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );

        h.uc.start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap();
        let err = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Domain(DomainError::AlreadyActive(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_starts_admit_exactly_one_run() {
        let h = harness();
        let hero = h.add_character(30, 5, 0);
        let mission = h.add_mission(
            vec![combat(50, 5, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );

        let first = tokio::spawn({
            let uc = h.uc.clone();
            async move { uc.start(&[hero], mission, LootMode::Auto, None, None).await }
        });
        let second = tokio::spawn({
            let uc = h.uc.clone();
            async move { uc.start(&[hero], mission, LootMode::Auto, None, None).await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(SessionError::Domain(DomainError::AlreadyActive(_)))
        )));
        assert_eq!(h.sessions.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_completes_and_distributes() {
        let h = harness();
        let hero = h.add_character(30, 20, 0);
        let reward = ItemId::new();
        let mission = h.add_mission(
            vec![combat(
                10,
                5,
                LootTable {
                    entries: vec![LootEntry {
                        item_id: reward,
                        quantity: 1,
                        chance: 100,
                    }],
                    currency_min: 90,
                    currency_max: 120,
                },
            )],
            DifficultyTier::Normal,
            1,
        );

        let session = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap();
        let target = sole_actor(&h.current_event(session.id()).await);

        // One blow kills the monster; the budget of 1 closes the run.
        h.uc.submit_action(session.id(), hero, ActionKind::Attack { target })
            .await
            .unwrap();

        let session = h.session(session.id()).await;
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.stats().events_resolved, 1);
        assert_eq!(session.stats().monsters_slain, 1);
        assert_eq!(session.stats().damage_dealt, 10);
        assert_eq!(session.stats().currency_found, 90);
        assert_eq!(session.stats().xp_awarded, 50);

        // Auto mode: the drop goes to everyone, currency splits.
        assert_eq!(h.characters.items_of(hero), vec![(reward, 1)]);
        assert_eq!(h.characters.currency_of(hero), 90);
        assert_eq!(h.characters.experience_of(hero), 50);

        let published = h.publisher.drain();
        assert!(published
            .iter()
            .any(|e| matches!(e, EngineEvent::SessionCompleted { .. })));
        // 50 xp is not enough for level 2
        assert!(!published.iter().any(|e| matches!(e, EngineEvent::LevelUp { .. })));
    }

    #[tokio::test]
    async fn nightmare_tier_payout_levels_the_survivor_up() {
        let h = harness();
        let hero = h.add_character(30, 20, 0);
        let mission = h.add_mission(
            vec![combat(10, 5, LootTable::default())],
            DifficultyTier::Nightmare,
            1,
        );

        let session = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap();
        let target = sole_actor(&h.current_event(session.id()).await);
        h.uc.submit_action(session.id(), hero, ActionKind::Attack { target })
            .await
            .unwrap();

        assert_eq!(h.characters.experience_of(hero), 150);
        let published = h.publisher.drain();
        assert!(published
            .iter()
            .any(|e| matches!(e, EngineEvent::LevelUp { level: 2, .. })));
    }

    #[tokio::test]
    async fn duplicate_action_is_rejected_with_first_kept() {
        let h = harness();
        let hero = h.add_character(30, 5, 0);
        let mission = h.add_mission(
            vec![combat(100, 5, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );

        let session = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap();
        let target = sole_actor(&h.current_event(session.id()).await);

        h.uc.submit_action(session.id(), hero, ActionKind::Attack { target })
            .await
            .unwrap();
        let err = h
            .uc
            .submit_action(session.id(), hero, ActionKind::Attack { target })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Event(EventError::Domain(DomainError::DuplicateAction { .. }))
        ));

        let event = h.current_event(session.id()).await;
        assert_eq!(event.actions().len(), 1);
        assert_eq!(event.actors()[0].current_health, 95);
    }

    #[tokio::test]
    async fn tick_lands_due_swings_and_honors_a_block() {
        let h = harness();
        let hero = h.add_character(30, 1, 2);
        let mission = h.add_mission(
            vec![combat(100, 10, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );

        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();
        let target = sole_actor(&h.current_event(session_id).await);

        // attack_speed 1.0 puts the first swing 4000 ms out. At 3000 ms
        // the common block window (last 1200 ms) is open, parry is not.
        h.clock.advance_ms(3_000);
        h.uc.submit_action(session_id, hero, ActionKind::Block { target })
            .await
            .unwrap();

        h.clock.advance_ms(1_000);
        h.uc.tick_session(session_id).await.unwrap();
        let session = h.session(session_id).await;
        // raw 10 - 2 = 8, halved by the block
        assert_eq!(session.member(hero).unwrap().current_health(), 26);
        assert_eq!(session.stats().damage_taken, 4);

        // Next swing, unblocked, lands for the full 8.
        h.clock.advance_ms(4_000);
        h.uc.tick_session(session_id).await.unwrap();
        let session = h.session(session_id).await;
        assert_eq!(session.member(hero).unwrap().current_health(), 18);

        let published = h.publisher.drain();
        let attacks: Vec<_> = published
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ActorAttacked {
                    damage, mitigated, ..
                } => Some((*damage, *mitigated)),
                _ => None,
            })
            .collect();
        assert_eq!(attacks, vec![(4, true), (8, false)]);
    }

    #[tokio::test]
    async fn party_wipe_fails_the_session() {
        let h = harness();
        let hero = h.add_character(5, 1, 0);
        let mission = h.add_mission(
            vec![combat(100, 50, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );

        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();

        // First swing one-shots the hero; the wipe resolves the event and
        // fails the run.
        h.clock.advance_ms(4_000);
        h.uc.tick_session(session_id).await.unwrap();

        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Failed);
        assert!(h
            .publisher
            .drain()
            .iter()
            .any(|e| matches!(e, EngineEvent::SessionFailed { .. })));
        // No rewards on a wipe
        assert_eq!(h.characters.experience_of(hero), 0);
    }

    #[tokio::test]
    async fn boss_template_is_not_drawn_twice() {
        let h = harness();
        let hero = h.add_character(30, 20, 0);
        let boss = EventTemplate::new(
            "warden",
            EventPayload::Boss {
                spawn: single_spawn(monster(10, 5)),
                loot: LootTable::default(),
            },
        );
        let treasure = EventTemplate::new(
            "cache",
            EventPayload::Treasure {
                loot: LootTable::default(),
            },
        );
        // The boss sits in the first bucket, so the deterministic draw
        // would pick it every time if it stayed eligible.
        let mission = h.add_mission(vec![boss, treasure], DifficultyTier::Normal, 2);

        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();

        let first = h.current_event(session_id).await;
        assert_eq!(first.kind(), EventKind::Boss);
        let target = sole_actor(&first);
        h.uc.submit_action(session_id, hero, ActionKind::Attack { target })
            .await
            .unwrap();

        let second = h.current_event(session_id).await;
        assert_eq!(second.kind(), EventKind::Treasure);
        h.uc.submit_action(session_id, hero, ActionKind::Collect)
            .await
            .unwrap();

        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.stats().events_resolved, 2);
    }

    #[tokio::test]
    async fn run_completes_once_every_template_has_been_used() {
        let h = harness();
        let hero = h.add_character(30, 20, 0);
        let cache = EventTemplate::new(
            "cache",
            EventPayload::Treasure {
                loot: LootTable::default(),
            },
        );
        // Budget far above the pool size: the run must end because both
        // templates have been drawn, not because the budget ran out.
        let mission = h.add_mission(
            vec![combat(10, 5, LootTable::default()), cache],
            DifficultyTier::Normal,
            10,
        );

        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();

        let first = h.current_event(session_id).await;
        assert_eq!(first.kind(), EventKind::Combat);
        let target = sole_actor(&first);
        h.uc.submit_action(session_id, hero, ActionKind::Attack { target })
            .await
            .unwrap();

        let second = h.current_event(session_id).await;
        assert_eq!(second.kind(), EventKind::Treasure);
        h.uc.submit_action(session_id, hero, ActionKind::Collect)
            .await
            .unwrap();

        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.stats().events_resolved, 2);
    }

    #[tokio::test]
    async fn exhausted_event_pool_completes_below_budget() {
        let h = harness();
        let hero = h.add_character(30, 20, 0);
        let boss = EventTemplate::new(
            "warden",
            EventPayload::Boss {
                spawn: single_spawn(monster(10, 5)),
                loot: LootTable::default(),
            },
        );
        let mission = h.add_mission(vec![boss], DifficultyTier::Normal, 5);

        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();
        let target = sole_actor(&h.current_event(session_id).await);
        h.uc.submit_action(session_id, hero, ActionKind::Attack { target })
            .await
            .unwrap();

        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.stats().events_resolved, 1);
    }

    #[tokio::test]
    async fn choice_timeout_resolves_with_the_default() {
        let h = harness();
        let hero = h.add_character(30, 5, 0);
        let fork = EventTemplate::new(
            "fork in the road",
            EventPayload::Choice {
                options: vec!["left".into(), "right".into()],
            },
        )
        .with_timeout_ms(1_000);
        let mission = h.add_mission(vec![fork], DifficultyTier::Normal, 1);

        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();

        // Nobody answers; the timeout takes the default path.
        h.clock.advance_ms(1_001);
        h.uc.tick_session(session_id).await.unwrap();

        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.timeline().len(), 1);
    }

    #[tokio::test]
    async fn trap_spares_dodgers_and_hits_the_rest() {
        let h = harness();
        let nimble = h.add_character(30, 5, 0);
        let sluggard = h.add_character(30, 5, 0);
        let pit = EventTemplate::new("spike pit", EventPayload::Trap { damage: 12 })
            .with_timeout_ms(5_000);
        let mission = h.add_mission(vec![pit], DifficultyTier::Normal, 1);

        let session_id = h
            .uc
            .start(&[nimble, sluggard], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();

        h.uc.submit_action(session_id, nimble, ActionKind::Dodge)
            .await
            .unwrap();
        // One reaction is not enough; the event waits for the other member.
        assert_eq!(h.session(session_id).await.status(), SessionStatus::Active);

        h.clock.advance_ms(5_001);
        h.uc.tick_session(session_id).await.unwrap();

        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.member(nimble).unwrap().current_health(), 30);
        assert_eq!(session.member(sluggard).unwrap().current_health(), 18);
        assert_eq!(session.stats().damage_taken, 12);
    }

    #[tokio::test]
    async fn puzzle_reward_depends_on_the_chosen_option() {
        let h = harness();
        let relic = ItemId::new();
        let riddle = |name: &str| {
            EventTemplate::new(
                name,
                EventPayload::Puzzle {
                    options: vec!["speak friend".into(), "force the door".into()],
                    reward: LootTable {
                        entries: vec![LootEntry {
                            item_id: relic,
                            quantity: 1,
                            chance: 100,
                        }],
                        currency_min: 0,
                        currency_max: 0,
                    },
                },
            )
        };

        let solver = h.add_character(30, 5, 0);
        let mission = h.add_mission(vec![riddle("door")], DifficultyTier::Normal, 1);
        let session_id = h
            .uc
            .start(&[solver], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();
        h.uc.submit_action(session_id, solver, ActionKind::ChooseOption { index: 0 })
            .await
            .unwrap();
        assert_eq!(h.session(session_id).await.status(), SessionStatus::Completed);
        assert_eq!(h.characters.items_of(solver), vec![(relic, 1)]);

        let bungler = h.add_character(30, 5, 0);
        let mission = h.add_mission(vec![riddle("gate")], DifficultyTier::Normal, 1);
        let session_id = h
            .uc
            .start(&[bungler], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();
        h.uc.submit_action(session_id, bungler, ActionKind::ChooseOption { index: 1 })
            .await
            .unwrap();
        assert_eq!(h.session(session_id).await.status(), SessionStatus::Completed);
        assert!(h.characters.items_of(bungler).is_empty());
    }

    #[tokio::test]
    async fn rest_heals_the_living_by_a_share_of_max_health() {
        let h = harness();
        let hero = h.add_character(30, 20, 2);
        let campfire = EventTemplate::new("campfire", EventPayload::Rest { heal_percent: 20 });
        let mission = h.add_mission(
            vec![combat(10, 10, LootTable::default()), campfire],
            DifficultyTier::Normal,
            2,
        );

        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();
        let target = sole_actor(&h.current_event(session_id).await);

        // Take one swing (10 - 2 defense = 8), then finish the fight.
        h.clock.advance_ms(4_000);
        h.uc.tick_session(session_id).await.unwrap();
        h.uc.submit_action(session_id, hero, ActionKind::Attack { target })
            .await
            .unwrap();

        let camp = h.current_event(session_id).await;
        assert_eq!(camp.kind(), EventKind::Rest);
        h.uc.submit_action(session_id, hero, ActionKind::Rest)
            .await
            .unwrap();

        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Completed);
        // 22 after the hit, plus 20% of 30 back
        assert_eq!(session.member(hero).unwrap().current_health(), 28);
    }

    #[tokio::test]
    async fn expiry_fails_the_run_exactly_once() {
        let h = harness();
        let hero = h.add_character(30, 5, 0);
        let mission = h.add_mission(
            vec![combat(100, 5, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );
        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();

        h.uc.check_expiry(session_id).await.unwrap();
        assert_eq!(h.session(session_id).await.status(), SessionStatus::Active);

        h.clock.advance_ms(600_001);
        h.uc.check_expiry(session_id).await.unwrap();
        h.uc.check_expiry(session_id).await.unwrap();

        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Failed);
        let failures = h
            .publisher
            .drain()
            .iter()
            .filter(|e| matches!(e, EngineEvent::SessionFailed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn abandon_requires_party_membership() {
        let h = harness();
        let hero = h.add_character(30, 5, 0);
        let stranger = CharacterId::new();
        let mission = h.add_mission(
            vec![combat(100, 5, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );
        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();

        assert!(h.uc.abandon(session_id, stranger).await.is_err());
        assert_eq!(h.session(session_id).await.status(), SessionStatus::Active);

        h.uc.abandon(session_id, hero).await.unwrap();
        let session = h.session(session_id).await;
        assert_eq!(session.status(), SessionStatus::Abandoned);
        assert!(h
            .publisher
            .drain()
            .iter()
            .any(|e| matches!(e, EngineEvent::SessionAbandoned { .. })));
    }

    #[tokio::test]
    async fn cleanup_cascades_but_never_touches_active_runs() {
        let h = harness();
        let hero = h.add_character(30, 5, 0);
        let mission = h.add_mission(
            vec![combat(100, 5, LootTable::default())],
            DifficultyTier::Normal,
            3,
        );
        let session_id = h
            .uc
            .start(&[hero], mission, LootMode::Auto, None, None)
            .await
            .unwrap()
            .id();

        h.uc.cleanup_session(session_id).await.unwrap();
        assert!(h.sessions.get(session_id).await.unwrap().is_some());

        h.uc.abandon(session_id, hero).await.unwrap();
        h.uc.cleanup_session(session_id).await.unwrap();
        assert!(h.sessions.get(session_id).await.unwrap().is_none());
        assert!(h.loot.list_for_session(session_id).await.unwrap().is_empty());
    }
}
