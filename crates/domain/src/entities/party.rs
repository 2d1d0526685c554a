//! Per-session party member combat state.
//!
//! Derived state held for the lifetime of one session, not persisted
//! beyond it. All health mutation funnels through the clamped methods
//! here; the session controller is the only writer.

use serde::{Deserialize, Serialize};

use crate::ids::CharacterId;

/// One party member's combat bookkeeping within a session.
///
/// # Invariants
///
/// - `current_health` stays within `[0, max_health]`
/// - a member at zero health is dead and excluded from target selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyMember {
    character_id: CharacterId,
    /// Position in party-join order; used as the deterministic tie-break
    /// for currency remainders and target selection.
    join_order: u32,
    current_health: u32,
    max_health: u32,
    attack: u32,
    defense: u32,
}

impl PartyMember {
    pub fn new(
        character_id: CharacterId,
        join_order: u32,
        max_health: u32,
        attack: u32,
        defense: u32,
    ) -> Self {
        Self {
            character_id,
            join_order,
            current_health: max_health,
            max_health,
            attack,
            defense,
        }
    }

    #[inline]
    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    #[inline]
    pub fn join_order(&self) -> u32 {
        self.join_order
    }

    #[inline]
    pub fn current_health(&self) -> u32 {
        self.current_health
    }

    #[inline]
    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    #[inline]
    pub fn attack(&self) -> u32 {
        self.attack
    }

    #[inline]
    pub fn defense(&self) -> u32 {
        self.defense
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.current_health > 0
    }

    /// Subtract damage, clamped at zero. Returns the amount actually taken.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let taken = amount.min(self.current_health);
        self.current_health -= taken;
        taken
    }

    /// Add healing, clamped at max health. Dead members stay dead.
    /// Returns the amount actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if !self.is_alive() {
            return 0;
        }
        let restored = amount.min(self.max_health - self.current_health);
        self.current_health += restored;
        restored
    }
}

/// Pick the tick-attack target: lowest current health among living
/// members, ties broken by join order.
pub fn select_target(members: &[PartyMember]) -> Option<&PartyMember> {
    members
        .iter()
        .filter(|m| m.is_alive())
        .min_by_key(|m| (m.current_health, m.join_order))
}
