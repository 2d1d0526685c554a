//! Loot distribution coordination.
//!
//! Runs when a session completes: currency always splits evenly, items go
//! through the party's configured mode (auto duplication, need/greed
//! rolls, or master-looter assignment). Every mutation of a loot record
//! happens under its session's lock.

use std::sync::Arc;

use delve_domain::{
    CharacterId, DomainError, DungeonLoot, DungeonSession, EngineEvent, LootId, LootMode,
    LootRoll, LootStatus, RollKind,
};

use crate::infrastructure::locks::SessionLocks;
use crate::infrastructure::ports::{
    CharacterRepo, ClockPort, LootRepo, PublisherPort, RandomPort, RepoError, SessionRepo,
};
use crate::infrastructure::settings::EngineSettings;

#[derive(Debug, thiserror::Error)]
pub enum LootError {
    #[error("Loot not found")]
    NotFound,
    #[error("Session not found")]
    SessionNotFound,
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

pub struct LootUseCases {
    loot: Arc<dyn LootRepo>,
    sessions: Arc<dyn SessionRepo>,
    characters: Arc<dyn CharacterRepo>,
    publisher: Arc<dyn PublisherPort>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
    locks: Arc<SessionLocks>,
    settings: EngineSettings,
}

impl LootUseCases {
    pub fn new(
        loot: Arc<dyn LootRepo>,
        sessions: Arc<dyn SessionRepo>,
        characters: Arc<dyn CharacterRepo>,
        publisher: Arc<dyn PublisherPort>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        locks: Arc<SessionLocks>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            loot,
            sessions,
            characters,
            publisher,
            clock,
            random,
            locks,
            settings,
        }
    }

    // =========================================================================
    // Distribution kickoff (caller already holds the session lock)
    // =========================================================================

    /// Distribute a completed session's drops. Idempotent per drop:
    /// already-assigned records are skipped.
    pub async fn distribute(&self, session: &DungeonSession) -> Result<(), LootError> {
        self.split_currency(session).await?;

        let drops = self.loot.list_for_session(session.id()).await?;
        for mut drop in drops {
            if drop.status() != LootStatus::Pending {
                continue;
            }
            match session.loot_mode() {
                LootMode::Auto => {
                    // Every member receives the drop, duplicated.
                    for member in session.party() {
                        self.characters
                            .grant_item(member.character_id(), drop.item_id(), drop.quantity())
                            .await?;
                    }
                    drop.assign_shared()?;
                    self.loot.save(&drop).await?;
                }
                LootMode::NeedGreed => {
                    let expected: Vec<CharacterId> =
                        session.living_members().map(|m| m.character_id()).collect();
                    if expected.is_empty() {
                        drop.assign_shared()?;
                        self.loot.save(&drop).await?;
                        continue;
                    }
                    let deadline = self.clock.now()
                        + chrono::Duration::milliseconds(self.settings.roll_timeout_ms);
                    drop.open_rolls(expected, deadline)?;
                    self.loot.save(&drop).await?;
                    self.publisher.publish(EngineEvent::LootAvailable {
                        session_id: session.id(),
                        loot_id: drop.id(),
                        item_id: drop.item_id(),
                        quantity: drop.quantity(),
                    });
                }
                LootMode::MasterLooter => {
                    // Stays PENDING until the master looter assigns it.
                    self.publisher.publish(EngineEvent::LootAvailable {
                        session_id: session.id(),
                        loot_id: drop.id(),
                        item_id: drop.item_id(),
                        quantity: drop.quantity(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Currency splits evenly in every mode; the remainder goes one unit
    /// at a time to members in party-join order so totals stay exact.
    async fn split_currency(&self, session: &DungeonSession) -> Result<(), LootError> {
        let total = session.stats().currency_found;
        if total == 0 {
            return Ok(());
        }
        let mut members: Vec<_> = session.party().to_vec();
        members.sort_by_key(|m| m.join_order());
        let count = members.len() as u64;
        let base = total / count;
        let remainder = total % count;

        for (i, member) in members.iter().enumerate() {
            let share = base + if (i as u64) < remainder { 1 } else { 0 };
            if share > 0 {
                self.characters
                    .grant_currency(member.character_id(), share)
                    .await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Rolls
    // =========================================================================

    /// Submit a need/greed roll. The numeric value is drawn 1-100 here;
    /// the first roll per character wins, later ones are rejected.
    pub async fn submit_roll(
        &self,
        loot_id: LootId,
        character_id: CharacterId,
        kind: RollKind,
    ) -> Result<(), LootError> {
        let drop = self.loot.get(loot_id).await?.ok_or(LootError::NotFound)?;
        let _guard = self.locks.acquire(drop.session_id()).await;

        // Reload under the lock; another roll may have landed meanwhile.
        let mut drop = self.loot.get(loot_id).await?.ok_or(LootError::NotFound)?;
        let now = self.clock.now();
        drop.submit_roll(LootRoll {
            character_id,
            kind,
            value: self.random.gen_range(1, 100) as u32,
            submitted_at: now,
        })?;

        if drop.all_rolled() {
            self.finalize(&mut drop).await?;
        }
        self.loot.save(&drop).await?;
        Ok(())
    }

    /// Master-looter manual assignment.
    pub async fn assign_manually(
        &self,
        loot_id: LootId,
        by: CharacterId,
        to: CharacterId,
    ) -> Result<(), LootError> {
        let drop = self.loot.get(loot_id).await?.ok_or(LootError::NotFound)?;
        let _guard = self.locks.acquire(drop.session_id()).await;

        let mut drop = self.loot.get(loot_id).await?.ok_or(LootError::NotFound)?;
        let session = self
            .sessions
            .get(drop.session_id())
            .await?
            .ok_or(LootError::SessionNotFound)?;

        if session.loot_mode() != LootMode::MasterLooter {
            return Err(LootError::Permission(
                "party does not use master looting".into(),
            ));
        }
        if session.master_looter() != Some(by) {
            return Err(LootError::Permission(format!(
                "character {by} is not the master looter"
            )));
        }
        if !session.has_member(to) {
            return Err(DomainError::not_found("PartyMember", to).into());
        }

        drop.assign(to)?;
        self.characters
            .grant_item(to, drop.item_id(), drop.quantity())
            .await?;
        self.loot.save(&drop).await?;
        self.publisher.publish(EngineEvent::LootAssigned {
            session_id: drop.session_id(),
            loot_id: drop.id(),
            character_id: to,
        });
        Ok(())
    }

    /// Collapse drops whose roll deadline has passed (scheduler path).
    /// Per-drop failures are isolated by the caller.
    pub async fn collapse_due_rolls(&self) -> Result<(), LootError> {
        let now = self.clock.now();
        for drop in self.loot.list_rolling().await? {
            if !drop.deadline_passed(now) {
                continue;
            }
            let _guard = self.locks.acquire(drop.session_id()).await;
            let Some(mut drop) = self.loot.get(drop.id()).await? else {
                continue;
            };
            if drop.status() != LootStatus::Rolling || !drop.deadline_passed(now) {
                continue;
            }
            self.finalize(&mut drop).await?;
            self.loot.save(&drop).await?;
        }
        Ok(())
    }

    /// Assign a rolling drop to its best roll, falling back to the first
    /// expected roller when nobody responded.
    async fn finalize(&self, drop: &mut DungeonLoot) -> Result<(), LootError> {
        let winner = drop
            .best_roll()
            .map(|r| r.character_id)
            .or_else(|| drop.expected_rollers().first().copied());
        let Some(winner) = winner else {
            return Ok(()); // nothing sensible to do; drop stays rolling
        };
        drop.assign(winner)?;
        self.characters
            .grant_item(winner, drop.item_id(), drop.quantity())
            .await?;
        self.publisher.publish(EngineEvent::LootAssigned {
            session_id: drop.session_id(),
            loot_id: drop.id(),
            character_id: winner,
        });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
