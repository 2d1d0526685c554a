//! DungeonEvent aggregate - one step in a session's timeline.
//!
//! # Rustic DDD Design
//!
//! - **Private fields**: all state is encapsulated
//! - **Guarded transitions**: PENDING -> ACTIVE -> RESOLVED, each crossed
//!   exactly once via `activate()` / `resolve()`
//! - **At-most-once input**: one action per (event, character); the second
//!   submission is rejected, never overwritten
//!
//! The aggregate holds combat state (actor roster, registered block/parry
//! mitigations) but leaves outcome arithmetic to the engine's event use
//! cases, which own the serialized resolution path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::action::PlayerAction;
use crate::entities::actor::ActorSnapshot;
use crate::entities::mission::EventKind;
use crate::error::DomainError;
use crate::ids::{ActorId, CharacterId, DungeonEventId, EventTemplateId, SessionId};

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Active,
    Resolved,
}

/// A block/parry registered against one actor's next swing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Mitigation {
    character_id: CharacterId,
    factor: f32,
    /// The swing this mitigation was aimed at; a later swing discards it.
    expires_at: DateTime<Utc>,
}

/// One step in a session's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DungeonEvent {
    id: DungeonEventId,
    session_id: SessionId,
    template_id: EventTemplateId,
    kind: EventKind,
    /// Monotonic per session.
    sequence: u32,
    status: EventStatus,
    /// Spawned roster for COMBAT/BOSS kinds; empty otherwise.
    actors: Vec<ActorSnapshot>,
    /// Submitted actions, unique per character.
    actions: Vec<PlayerAction>,
    /// Registered timed mitigations, keyed by the actor they target.
    mitigations: Vec<(ActorId, Mitigation)>,
    /// Branching child events point back at their parent.
    parent_id: Option<DungeonEventId>,
    activated_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    /// Resolution timeout in milliseconds from activation, when set.
    timeout_ms: Option<i64>,
}

impl DungeonEvent {
    pub fn new(
        session_id: SessionId,
        template_id: EventTemplateId,
        kind: EventKind,
        sequence: u32,
    ) -> Self {
        Self {
            id: DungeonEventId::new(),
            session_id,
            template_id,
            kind,
            sequence,
            status: EventStatus::Pending,
            actors: Vec::new(),
            actions: Vec::new(),
            mitigations: Vec::new(),
            parent_id: None,
            activated_at: None,
            resolved_at: None,
            timeout_ms: None,
        }
    }

    /// Link a branching child event back to its parent.
    pub fn with_parent(mut self, parent_id: DungeonEventId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn id(&self) -> DungeonEventId {
        self.id
    }

    #[inline]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[inline]
    pub fn template_id(&self) -> EventTemplateId {
        self.template_id
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[inline]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    #[inline]
    pub fn status(&self) -> EventStatus {
        self.status
    }

    #[inline]
    pub fn parent_id(&self) -> Option<DungeonEventId> {
        self.parent_id
    }

    #[inline]
    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at
    }

    #[inline]
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    #[inline]
    pub fn actors(&self) -> &[ActorSnapshot] {
        &self.actors
    }

    #[inline]
    pub fn actions(&self) -> &[PlayerAction] {
        &self.actions
    }

    pub fn actor(&self, actor_id: ActorId) -> Option<&ActorSnapshot> {
        self.actors.iter().find(|a| a.id == actor_id)
    }

    pub fn all_actors_dead(&self) -> bool {
        self.actors.iter().all(|a| !a.is_alive())
    }

    pub fn has_action_from(&self, character_id: CharacterId) -> bool {
        self.actions.iter().any(|a| a.character_id == character_id)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// PENDING -> ACTIVE. Installs the actor roster (already staggered by
    /// the spawner) and the resolution timeout.
    pub fn activate(
        &mut self,
        now: DateTime<Utc>,
        actors: Vec<ActorSnapshot>,
        timeout_ms: Option<i64>,
    ) -> Result<(), DomainError> {
        if self.status != EventStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "event {} cannot activate from {:?}",
                self.id, self.status
            )));
        }
        self.status = EventStatus::Active;
        self.activated_at = Some(now);
        self.actors = actors;
        self.timeout_ms = timeout_ms;
        Ok(())
    }

    /// ACTIVE -> RESOLVED, exactly once. A double resolve is a state
    /// conflict, not a crash; it should be unreachable given per-session
    /// serialization.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != EventStatus::Active {
            return Err(DomainError::invalid_state(format!(
                "event {} cannot resolve from {:?}",
                self.id, self.status
            )));
        }
        self.status = EventStatus::Resolved;
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Record a player's submission. First submission wins; the event must
    /// be ACTIVE.
    pub fn submit_action(&mut self, action: PlayerAction) -> Result<(), DomainError> {
        if self.status != EventStatus::Active {
            return Err(DomainError::invalid_state(format!(
                "event {} is not accepting actions ({:?})",
                self.id, self.status
            )));
        }
        if self.has_action_from(action.character_id) {
            return Err(DomainError::DuplicateAction {
                event_id: self.id.to_string(),
                character_id: action.character_id.to_string(),
            });
        }
        self.actions.push(action);
        Ok(())
    }

    /// Whether this event's resolution condition is now satisfied.
    ///
    /// `living` is the set of party members still alive, supplied by the
    /// session controller.
    pub fn resolution_satisfied(&self, living: &[CharacterId]) -> bool {
        match self.kind {
            EventKind::Combat | EventKind::Boss => self.all_actors_dead() || living.is_empty(),
            EventKind::Trap => living.iter().all(|c| self.has_action_from(*c)),
            EventKind::Treasure | EventKind::Puzzle | EventKind::Choice | EventKind::Rest => {
                !self.actions.is_empty()
            }
        }
    }

    /// True when an ACTIVE event has outlived its resolution timeout.
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status != EventStatus::Active {
            return false;
        }
        match (self.activated_at, self.timeout_ms) {
            (Some(activated), Some(timeout)) => {
                activated + chrono::Duration::milliseconds(timeout) < now
            }
            _ => false,
        }
    }

    // =========================================================================
    // Combat state
    // =========================================================================

    /// Apply damage to an actor. Returns the amount dealt and whether the
    /// actor died from it.
    pub fn damage_actor(
        &mut self,
        actor_id: ActorId,
        amount: u32,
    ) -> Result<(u32, bool), DomainError> {
        let actor = self
            .actors
            .iter_mut()
            .find(|a| a.id == actor_id)
            .ok_or_else(|| DomainError::not_found("Actor", actor_id))?;
        if !actor.is_alive() {
            return Err(DomainError::invalid_state("actor is already dead"));
        }
        let dealt = actor.take_damage(amount);
        Ok((dealt, !actor.is_alive()))
    }

    /// Living actors whose scheduled swing is due at `now`.
    pub fn due_actor_ids(&self, now: DateTime<Utc>) -> Vec<ActorId> {
        self.actors
            .iter()
            .filter(|a| a.is_alive() && a.next_attack_at <= now)
            .map(|a| a.id)
            .collect()
    }

    /// Reschedule an actor's swing one interval past `now`.
    pub fn reschedule_actor(&mut self, actor_id: ActorId, now: DateTime<Utc>) {
        if let Some(actor) = self.actors.iter_mut().find(|a| a.id == actor_id) {
            actor.reschedule_attack(now);
        }
    }

    /// Register a timed mitigation against an actor's next swing. A newer
    /// registration from the same character replaces the old one.
    pub fn register_mitigation(
        &mut self,
        actor_id: ActorId,
        character_id: CharacterId,
        factor: f32,
        expires_at: DateTime<Utc>,
    ) {
        self.mitigations
            .retain(|(a, m)| !(*a == actor_id && m.character_id == character_id));
        self.mitigations.push((
            actor_id,
            Mitigation {
                character_id,
                factor,
                expires_at,
            },
        ));
    }

    /// Consume the mitigation registered by `target` against `actor_id`.
    /// Valid only if it was aimed at a swing no earlier than `swing_at`;
    /// a mitigation registered against an earlier, already-landed swing
    /// is stale and discarded.
    pub fn take_mitigation(
        &mut self,
        actor_id: ActorId,
        target: CharacterId,
        swing_at: DateTime<Utc>,
    ) -> Option<f32> {
        let idx = self
            .mitigations
            .iter()
            .position(|(a, m)| *a == actor_id && m.character_id == target)?;
        let (_, m) = self.mitigations.swap_remove(idx);
        if m.expires_at >= swing_at {
            Some(m.factor)
        } else {
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::action::{ActionKind, TimingGrade};
    use crate::entities::actor::Rarity;
    use crate::ids::MonsterTemplateId;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn actor(health: u32) -> ActorSnapshot {
        ActorSnapshot {
            id: ActorId::new(),
            template_id: MonsterTemplateId::new(),
            name: "Husk".into(),
            current_health: health,
            max_health: health.max(1),
            attack: 8,
            defense: 2,
            rarity: Rarity::Common,
            attack_interval_ms: 4000,
            next_attack_at: now() + chrono::Duration::milliseconds(4000),
        }
    }

    fn combat_event(actors: Vec<ActorSnapshot>) -> DungeonEvent {
        let mut e = DungeonEvent::new(SessionId::new(), EventTemplateId::new(), EventKind::Combat, 0);
        e.activate(now(), actors, Some(60_000)).unwrap();
        e
    }

    fn action(character_id: CharacterId) -> PlayerAction {
        PlayerAction {
            character_id,
            kind: ActionKind::Collect,
            grade: TimingGrade::Untimed,
            submitted_at: now(),
        }
    }

    #[test]
    fn lifecycle_transitions_are_guarded() {
        let mut e = DungeonEvent::new(SessionId::new(), EventTemplateId::new(), EventKind::Choice, 0);
        assert_eq!(e.status(), EventStatus::Pending);
        // Cannot resolve before activation
        assert!(e.resolve(now()).unwrap_err().is_state_conflict());

        e.activate(now(), vec![], Some(60_000)).unwrap();
        assert_eq!(e.status(), EventStatus::Active);
        // Double activation is a conflict
        assert!(e.activate(now(), vec![], None).unwrap_err().is_state_conflict());

        e.resolve(now()).unwrap();
        assert_eq!(e.status(), EventStatus::Resolved);
        assert!(e.resolve(now()).unwrap_err().is_state_conflict());
    }

    #[test]
    fn duplicate_action_is_rejected_not_overwritten() {
        let mut e = combat_event(vec![actor(10)]);
        let character = CharacterId::new();
        e.submit_action(action(character)).unwrap();
        let err = e.submit_action(action(character)).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateAction { .. }));
        assert_eq!(e.actions().len(), 1);
    }

    #[test]
    fn actions_rejected_unless_active() {
        let mut e = DungeonEvent::new(SessionId::new(), EventTemplateId::new(), EventKind::Choice, 0);
        assert!(e.submit_action(action(CharacterId::new())).unwrap_err().is_state_conflict());
    }

    #[test]
    fn combat_resolves_when_roster_or_party_is_down() {
        let mut e = combat_event(vec![actor(10)]);
        let living = vec![CharacterId::new()];
        assert!(!e.resolution_satisfied(&living));

        // Party wiped
        assert!(e.resolution_satisfied(&[]));

        // Roster wiped
        let id = e.actors()[0].id;
        e.damage_actor(id, 10).unwrap();
        assert!(e.resolution_satisfied(&living));
    }

    #[test]
    fn trap_requires_every_living_member() {
        let mut e = DungeonEvent::new(SessionId::new(), EventTemplateId::new(), EventKind::Trap, 0);
        e.activate(now(), vec![], Some(60_000)).unwrap();
        let a = CharacterId::new();
        let b = CharacterId::new();
        e.submit_action(action(a)).unwrap();
        assert!(!e.resolution_satisfied(&[a, b]));
        e.submit_action(action(b)).unwrap();
        assert!(e.resolution_satisfied(&[a, b]));
    }

    #[test]
    fn choice_resolves_on_first_submission() {
        let mut e = DungeonEvent::new(SessionId::new(), EventTemplateId::new(), EventKind::Choice, 0);
        e.activate(now(), vec![], None).unwrap();
        assert!(!e.resolution_satisfied(&[CharacterId::new()]));
        e.submit_action(action(CharacterId::new())).unwrap();
        assert!(e.resolution_satisfied(&[CharacterId::new()]));
    }

    #[test]
    fn timeout_requires_activation_and_deadline() {
        let mut e = DungeonEvent::new(SessionId::new(), EventTemplateId::new(), EventKind::Choice, 0);
        assert!(!e.timed_out(now()));
        e.activate(now(), vec![], Some(30_000)).unwrap();
        assert!(!e.timed_out(now() + chrono::Duration::milliseconds(30_000)));
        assert!(e.timed_out(now() + chrono::Duration::milliseconds(30_001)));
        e.resolve(now()).unwrap();
        assert!(!e.timed_out(now() + chrono::Duration::seconds(120)));
    }

    #[test]
    fn due_actors_and_reschedule() {
        let mut e = combat_event(vec![actor(10), actor(10)]);
        let later = now() + chrono::Duration::milliseconds(4000);
        assert_eq!(e.due_actor_ids(now()).len(), 0);
        assert_eq!(e.due_actor_ids(later).len(), 2);

        let first = e.actors()[0].id;
        e.reschedule_actor(first, later);
        assert_eq!(e.due_actor_ids(later), vec![e.actors()[1].id]);
    }

    #[test]
    fn dead_actors_never_come_due() {
        let mut e = combat_event(vec![actor(5)]);
        let id = e.actors()[0].id;
        e.damage_actor(id, 5).unwrap();
        let later = now() + chrono::Duration::milliseconds(10_000);
        assert!(e.due_actor_ids(later).is_empty());
        // Hitting a corpse is a state conflict
        assert!(e.damage_actor(id, 1).unwrap_err().is_state_conflict());
    }

    #[test]
    fn mitigation_is_consumed_once_and_expires() {
        let mut e = combat_event(vec![actor(10)]);
        let actor_id = e.actors()[0].id;
        let blocker = CharacterId::new();
        let swing = now() + chrono::Duration::milliseconds(500);

        e.register_mitigation(actor_id, blocker, 0.5, swing);
        assert_eq!(e.take_mitigation(actor_id, blocker, swing), Some(0.5));
        // Consumed
        assert_eq!(e.take_mitigation(actor_id, blocker, swing), None);

        // Registered for an earlier swing than the one landing: stale
        e.register_mitigation(actor_id, blocker, 1.0, swing);
        let late = swing + chrono::Duration::milliseconds(4000);
        assert_eq!(e.take_mitigation(actor_id, blocker, late), None);
    }

    #[test]
    fn mitigation_is_per_character() {
        let mut e = combat_event(vec![actor(10)]);
        let actor_id = e.actors()[0].id;
        let blocker = CharacterId::new();
        let swing = now() + chrono::Duration::milliseconds(500);
        e.register_mitigation(actor_id, blocker, 0.5, swing);
        // A different member eating the swing gets no benefit
        assert_eq!(e.take_mitigation(actor_id, CharacterId::new(), swing), None);
    }
}
