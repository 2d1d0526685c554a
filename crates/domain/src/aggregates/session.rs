//! DungeonSession aggregate - one mission run from start to terminal status.
//!
//! # Rustic DDD Design
//!
//! - **Private fields**: all state is encapsulated
//! - **Valid by construction**: `new()` validates the party and deadline
//! - **One-way transitions**: ACTIVE -> {COMPLETED, FAILED, ABANDONED},
//!   enforced by the transition methods; a terminal session never moves again
//!
//! The session controller is the exclusive owner of these transitions and
//! of party health; everything else reads through accessors.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::party::{select_target, PartyMember};
use crate::error::DomainError;
use crate::ids::{CharacterId, DungeonEventId, EventTemplateId, MissionId, SessionId};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// How drops are distributed for this party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LootMode {
    /// Every member receives every drop; currency splits evenly.
    Auto,
    /// Need/greed rolls per drop; currency splits evenly.
    NeedGreed,
    /// The master looter assigns drops manually; currency splits evenly.
    MasterLooter,
}

/// Run statistics accrued over a session, reported on completion and
/// deleted with the session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub events_resolved: u32,
    pub damage_dealt: u64,
    pub damage_taken: u64,
    pub monsters_slain: u32,
    pub currency_found: u64,
    pub xp_awarded: u64,
}

/// The aggregate root for one dungeon run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DungeonSession {
    id: SessionId,
    mission_id: MissionId,
    party: Vec<PartyMember>,
    loot_mode: LootMode,
    master_looter: Option<CharacterId>,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    /// Hard deadline; the scheduler fails the run past this instant.
    ends_at: DateTime<Utc>,
    /// When the session reached a terminal status (cleanup grace anchor).
    terminal_at: Option<DateTime<Utc>>,
    /// Resolved events in order.
    timeline: Vec<DungeonEventId>,
    /// The single ACTIVE (or PENDING) event, when one exists.
    current_event_id: Option<DungeonEventId>,
    /// Templates already drawn this run; selection never repeats one.
    used_templates: HashSet<EventTemplateId>,
    stats: SessionStats,
}

impl DungeonSession {
    /// Start a run. The party must be non-empty; when the mode is
    /// MASTER_LOOTER the looter must be a party member.
    pub fn new(
        mission_id: MissionId,
        party: Vec<PartyMember>,
        loot_mode: LootMode,
        master_looter: Option<CharacterId>,
        now: DateTime<Utc>,
        time_limit_ms: i64,
    ) -> Result<Self, DomainError> {
        if party.is_empty() {
            return Err(DomainError::validation("party cannot be empty"));
        }
        if loot_mode == LootMode::MasterLooter {
            let looter = master_looter
                .ok_or_else(|| DomainError::validation("master looter mode requires a looter"))?;
            if !party.iter().any(|m| m.character_id() == looter) {
                return Err(DomainError::validation(
                    "master looter must be a party member",
                ));
            }
        }
        if time_limit_ms <= 0 {
            return Err(DomainError::validation("time limit must be positive"));
        }
        Ok(Self {
            id: SessionId::new(),
            mission_id,
            party,
            loot_mode,
            master_looter,
            status: SessionStatus::Active,
            started_at: now,
            ends_at: now + chrono::Duration::milliseconds(time_limit_ms),
            terminal_at: None,
            timeline: Vec::new(),
            current_event_id: None,
            used_templates: HashSet::new(),
            stats: SessionStats::default(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[inline]
    pub fn mission_id(&self) -> MissionId {
        self.mission_id
    }

    #[inline]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[inline]
    pub fn loot_mode(&self) -> LootMode {
        self.loot_mode
    }

    #[inline]
    pub fn master_looter(&self) -> Option<CharacterId> {
        self.master_looter
    }

    #[inline]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[inline]
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    #[inline]
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        self.terminal_at
    }

    #[inline]
    pub fn timeline(&self) -> &[DungeonEventId] {
        &self.timeline
    }

    #[inline]
    pub fn current_event_id(&self) -> Option<DungeonEventId> {
        self.current_event_id
    }

    #[inline]
    pub fn used_templates(&self) -> &HashSet<EventTemplateId> {
        &self.used_templates
    }

    #[inline]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    #[inline]
    pub fn party(&self) -> &[PartyMember] {
        &self.party
    }

    pub fn member(&self, character_id: CharacterId) -> Option<&PartyMember> {
        self.party.iter().find(|m| m.character_id() == character_id)
    }

    pub fn has_member(&self, character_id: CharacterId) -> bool {
        self.member(character_id).is_some()
    }

    pub fn living_members(&self) -> impl Iterator<Item = &PartyMember> {
        self.party.iter().filter(|m| m.is_alive())
    }

    pub fn all_members_dead(&self) -> bool {
        self.party.iter().all(|m| !m.is_alive())
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.ends_at
    }

    /// Character id of the tick-attack target (lowest health living
    /// member, join-order tie-break).
    pub fn tick_target(&self) -> Option<CharacterId> {
        select_target(&self.party).map(|m| m.character_id())
    }

    // =========================================================================
    // Health funnel (sanctioned mutation path)
    // =========================================================================

    /// Apply damage to a member, clamped at zero. Returns damage taken.
    pub fn damage_member(
        &mut self,
        character_id: CharacterId,
        amount: u32,
    ) -> Result<u32, DomainError> {
        let member = self
            .party
            .iter_mut()
            .find(|m| m.character_id() == character_id)
            .ok_or_else(|| DomainError::not_found("PartyMember", character_id))?;
        let taken = member.take_damage(amount);
        self.stats.damage_taken += u64::from(taken);
        Ok(taken)
    }

    /// Heal a living member, clamped at max health. Returns amount restored.
    pub fn heal_member(
        &mut self,
        character_id: CharacterId,
        amount: u32,
    ) -> Result<u32, DomainError> {
        let member = self
            .party
            .iter_mut()
            .find(|m| m.character_id() == character_id)
            .ok_or_else(|| DomainError::not_found("PartyMember", character_id))?;
        Ok(member.heal(amount))
    }

    // =========================================================================
    // Event bookkeeping
    // =========================================================================

    /// Attach a newly created event as the session's current event.
    pub fn begin_event(&mut self, event_id: DungeonEventId) -> Result<(), DomainError> {
        self.ensure_active()?;
        if self.current_event_id.is_some() {
            return Err(DomainError::invalid_state(
                "session already has a current event",
            ));
        }
        self.current_event_id = Some(event_id);
        Ok(())
    }

    /// Move the resolved current event onto the timeline.
    pub fn finish_event(&mut self, event_id: DungeonEventId) -> Result<(), DomainError> {
        if self.current_event_id != Some(event_id) {
            return Err(DomainError::invalid_state(
                "event is not the session's current event",
            ));
        }
        self.current_event_id = None;
        self.timeline.push(event_id);
        self.stats.events_resolved += 1;
        Ok(())
    }

    /// Record a drawn template so selection excludes it afterwards.
    pub fn mark_template_used(&mut self, template_id: EventTemplateId) {
        self.used_templates.insert(template_id);
    }

    pub fn record_damage_dealt(&mut self, amount: u32) {
        self.stats.damage_dealt += u64::from(amount);
    }

    pub fn record_monster_slain(&mut self) {
        self.stats.monsters_slain += 1;
    }

    pub fn record_currency(&mut self, amount: u64) {
        self.stats.currency_found += amount;
    }

    pub fn record_xp(&mut self, amount: u64) {
        self.stats.xp_awarded += amount;
    }

    // =========================================================================
    // Status transitions (one-directional)
    // =========================================================================

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(SessionStatus::Completed, now)
    }

    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(SessionStatus::Failed, now)
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(SessionStatus::Abandoned, now)
    }

    fn transition(&mut self, to: SessionStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.status = to;
        self.terminal_at = Some(now);
        // Whatever event was in flight is abandoned in place.
        if let Some(event_id) = self.current_event_id.take() {
            self.timeline.push(event_id);
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.status != SessionStatus::Active {
            return Err(DomainError::invalid_state(format!(
                "session {} is already {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
