//! Event state machine operations.
//!
//! `EventOps` works on aggregates the session controller has already
//! loaded under the session lock; it never touches the session or event
//! repos itself, so every mutation stays on the caller's serialized path.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use delve_domain::{
    classify, ActionKind, CharacterId, DomainError, DungeonEvent, DungeonLoot, DungeonSession,
    EngineEvent, EventKind, EventPayload, EventTemplate, LootTable, PlayerAction, ReactionWindow,
    TimingGrade,
};

use crate::infrastructure::ports::{
    MissionRepo, PublisherPort, RandomPort, RepoError, SpawnError, SpawnerPort,
};
use crate::infrastructure::settings::EngineSettings;

/// Damage mitigation for an in-window block.
const BLOCK_MITIGATION: f32 = 0.5;
/// Damage mitigation for an in-window parry.
const PARRY_MITIGATION: f32 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event template {0} is not configured")]
    TemplateMissing(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

/// What resolving an event produced. The caller persists the loot rows
/// and decides the session's next step.
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub loot: Vec<DungeonLoot>,
    pub currency: u64,
}

pub struct EventOps {
    missions: Arc<dyn MissionRepo>,
    spawner: Arc<dyn SpawnerPort>,
    publisher: Arc<dyn PublisherPort>,
    random: Arc<dyn RandomPort>,
    settings: EngineSettings,
}

impl EventOps {
    pub fn new(
        missions: Arc<dyn MissionRepo>,
        spawner: Arc<dyn SpawnerPort>,
        publisher: Arc<dyn PublisherPort>,
        random: Arc<dyn RandomPort>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            missions,
            spawner,
            publisher,
            random,
            settings,
        }
    }

    /// Uniform draw in `[0, total)` for weighted template selection.
    pub fn draw(&self, total: u64) -> u64 {
        self.random.gen_range(0, total.saturating_sub(1))
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Create and activate an event from a template, attaching it to the
    /// session as its current event.
    pub async fn activate_from_template(
        &self,
        session: &mut DungeonSession,
        template: &EventTemplate,
        now: DateTime<Utc>,
    ) -> Result<DungeonEvent, EventError> {
        let sequence = session.stats().events_resolved;
        let mut event =
            DungeonEvent::new(session.id(), template.id(), template.kind(), sequence);

        let actors = match template.payload() {
            EventPayload::Combat { spawn, .. } => self.spawner.generate(spawn, false, now).await?,
            EventPayload::Boss { spawn, .. } => self.spawner.generate(spawn, true, now).await?,
            _ => Vec::new(),
        };

        let timeout = template
            .timeout_ms()
            .or(Some(self.settings.event_timeout_ms));
        event.activate(now, actors, timeout)?;

        session.mark_template_used(template.id());
        session.begin_event(event.id())?;

        self.publisher.publish(EngineEvent::EventActivated {
            session_id: session.id(),
            event_id: event.id(),
            sequence,
        });
        Ok(event)
    }

    // =========================================================================
    // Action submission
    // =========================================================================

    /// Record one player's action against the current event and apply its
    /// immediate effects (attack damage, timed mitigation registration).
    pub fn submit(
        &self,
        session: &mut DungeonSession,
        event: &mut DungeonEvent,
        character_id: CharacterId,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<(), EventError> {
        let member = session
            .member(character_id)
            .ok_or_else(|| DomainError::not_found("PartyMember", character_id))?;
        if !member.is_alive() {
            return Err(DomainError::invalid_state("dead members cannot act").into());
        }
        Self::check_kind(event.kind(), kind)?;
        let member_attack = member.attack();

        // Grade timed inputs against the targeted actor's schedule at the
        // moment of submission. Mistimed inputs stay accepted for audit.
        let grade = match kind {
            ActionKind::Block { target } | ActionKind::Parry { target } => {
                let actor = event
                    .actor(target)
                    .ok_or_else(|| DomainError::not_found("Actor", target))?;
                if !actor.is_alive() {
                    return Err(DomainError::invalid_state("target actor is dead").into());
                }
                let timing = classify(now, actor.next_attack_at, actor.attack_interval_ms, actor.rarity);
                let wanted_parry = matches!(kind, ActionKind::Parry { .. });
                let in_window = match timing.window {
                    ReactionWindow::Parry => true,
                    ReactionWindow::Block => !wanted_parry,
                    ReactionWindow::None => false,
                };
                if in_window {
                    TimingGrade::InWindow {
                        mitigation: if wanted_parry {
                            PARRY_MITIGATION
                        } else {
                            BLOCK_MITIGATION
                        },
                    }
                } else {
                    TimingGrade::Missed
                }
            }
            _ => TimingGrade::Untimed,
        };

        // Duplicate check happens inside the aggregate; first wins.
        event.submit_action(PlayerAction {
            character_id,
            kind,
            grade,
            submitted_at: now,
        })?;

        match kind {
            ActionKind::Attack { target } => {
                let actor = event
                    .actor(target)
                    .ok_or_else(|| DomainError::not_found("Actor", target))?;
                let damage = member_attack.saturating_sub(actor.defense).max(1);
                let (dealt, died) = event.damage_actor(target, damage)?;
                session.record_damage_dealt(dealt);
                if died {
                    session.record_monster_slain();
                }
            }
            ActionKind::Block { target } | ActionKind::Parry { target } => {
                if let TimingGrade::InWindow { mitigation } = grade {
                    // Aimed at the swing that was scheduled at submission.
                    let swing_at = event
                        .actor(target)
                        .map(|a| a.next_attack_at)
                        .unwrap_or(now);
                    event.register_mitigation(target, character_id, mitigation, swing_at);
                }
            }
            _ => {}
        }

        self.publisher.publish(EngineEvent::ActionAccepted {
            session_id: session.id(),
            event_id: event.id(),
            character_id,
        });
        Ok(())
    }

    fn check_kind(event_kind: EventKind, action: ActionKind) -> Result<(), EventError> {
        let ok = match event_kind {
            EventKind::Combat | EventKind::Boss => matches!(
                action,
                ActionKind::Attack { .. }
                    | ActionKind::Block { .. }
                    | ActionKind::Parry { .. }
                    | ActionKind::Flee
            ),
            EventKind::Treasure => matches!(action, ActionKind::Collect),
            EventKind::Trap => matches!(action, ActionKind::Dodge),
            EventKind::Puzzle | EventKind::Choice => {
                matches!(action, ActionKind::ChooseOption { .. })
            }
            EventKind::Rest => matches!(action, ActionKind::Rest),
        };
        if ok {
            Ok(())
        } else {
            Err(EventError::Validation(format!(
                "action {action:?} is not valid for a {event_kind:?} event"
            )))
        }
    }

    // =========================================================================
    // Tick-driven combat
    // =========================================================================

    /// Land every due actor swing against the lowest-health living member,
    /// honoring registered mitigations, then reschedule the swings.
    pub fn apply_due_attacks(
        &self,
        session: &mut DungeonSession,
        event: &mut DungeonEvent,
        now: DateTime<Utc>,
    ) -> Result<(), EventError> {
        for actor_id in event.due_actor_ids(now) {
            let Some(target) = session.tick_target() else {
                break; // party wiped mid-cycle
            };
            let Some(actor) = event.actor(actor_id) else {
                continue;
            };
            let swing_at = actor.next_attack_at;
            let raw = {
                let member = session
                    .member(target)
                    .ok_or_else(|| DomainError::not_found("PartyMember", target))?;
                actor.attack.saturating_sub(member.defense()).max(1)
            };
            let mitigation = event.take_mitigation(actor_id, target, swing_at).unwrap_or(0.0);
            let damage = ((raw as f32) * (1.0 - mitigation)).round() as u32;
            let taken = session.damage_member(target, damage)?;

            self.publisher.publish(EngineEvent::ActorAttacked {
                session_id: session.id(),
                event_id: event.id(),
                actor_id,
                target,
                damage: taken,
                mitigated: mitigation > 0.0,
            });
            event.reschedule_actor(actor_id, now);
        }
        Ok(())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve the event if its condition is satisfied or its timeout has
    /// lapsed. Applies the kind-specific outcome and moves the event onto
    /// the session timeline. Returns `None` when the event stays active.
    pub async fn try_resolve(
        &self,
        session: &mut DungeonSession,
        event: &mut DungeonEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<ResolutionOutcome>, EventError> {
        let living: Vec<CharacterId> =
            session.living_members().map(|m| m.character_id()).collect();
        let satisfied = event.resolution_satisfied(&living);
        if !satisfied && !event.timed_out(now) {
            return Ok(None);
        }

        let template = self
            .missions
            .get_event_template(event.template_id())
            .await?
            .ok_or_else(|| EventError::TemplateMissing(event.template_id().to_string()))?;

        let mut outcome = ResolutionOutcome::default();
        match template.payload() {
            EventPayload::Combat { loot, .. } | EventPayload::Boss { loot, .. } => {
                // Loot only drops on a victory, not on a wipe or timeout.
                if event.all_actors_dead() && !living.is_empty() {
                    self.roll_loot(session, loot, &mut outcome);
                }
            }
            EventPayload::Treasure { loot } => {
                if satisfied {
                    self.roll_loot(session, loot, &mut outcome);
                }
            }
            EventPayload::Trap { damage } => {
                // Everyone who failed to dodge before resolution eats the hit.
                for character_id in &living {
                    let dodged = event.actions().iter().any(|a| {
                        a.character_id == *character_id && matches!(a.kind, ActionKind::Dodge)
                    });
                    if !dodged {
                        session.damage_member(*character_id, *damage)?;
                    }
                }
            }
            EventPayload::Puzzle { reward, .. } => {
                let solved = event
                    .actions()
                    .iter()
                    .any(|a| matches!(a.kind, ActionKind::ChooseOption { index: 0 }));
                if solved {
                    self.roll_loot(session, reward, &mut outcome);
                }
            }
            EventPayload::Choice { .. } => {
                // Narrative only; a timeout counts as taking the default option.
            }
            EventPayload::Rest { heal_percent } => {
                for character_id in &living {
                    let amount = session
                        .member(*character_id)
                        .map(|m| {
                            let healed =
                                u64::from(m.max_health()) * u64::from(*heal_percent) / 100;
                            healed.min(u64::from(m.max_health())) as u32
                        })
                        .unwrap_or(0);
                    session.heal_member(*character_id, amount)?;
                }
            }
        }

        event.resolve(now)?;
        session.finish_event(event.id())?;
        self.publisher.publish(EngineEvent::EventResolved {
            session_id: session.id(),
            event_id: event.id(),
        });
        Ok(Some(outcome))
    }

    fn roll_loot(
        &self,
        session: &mut DungeonSession,
        table: &LootTable,
        outcome: &mut ResolutionOutcome,
    ) {
        for entry in &table.entries {
            if self.random.gen_range(1, 100) <= u64::from(entry.chance) {
                let drop = DungeonLoot::new(session.id(), entry.item_id, entry.quantity);
                self.publisher.publish(EngineEvent::LootAvailable {
                    session_id: session.id(),
                    loot_id: drop.id(),
                    item_id: drop.item_id(),
                    quantity: drop.quantity(),
                });
                outcome.loot.push(drop);
            }
        }
        if table.currency_max > 0 {
            let amount = self.random.gen_range(table.currency_min, table.currency_max);
            session.record_currency(amount);
            outcome.currency += amount;
        }
    }
}
