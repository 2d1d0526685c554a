//! Combat actor snapshots spawned into COMBAT/BOSS events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, MonsterTemplateId};

/// Rarity tier of a spawned actor.
///
/// Rarity drives both stat multipliers and the reaction windows of the
/// timing model. Tougher foes get narrower windows to raise difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Elite,
    Rare,
    Boss,
}

impl Rarity {
    /// Multiplier applied to health, attack, and defense.
    pub fn stat_multiplier(self) -> f32 {
        match self {
            Self::Common => 1.0,
            Self::Elite => 1.5,
            Self::Rare => 2.0,
            Self::Boss => 2.0,
        }
    }

    /// Width of the parry window in milliseconds before the next attack.
    pub fn parry_window_ms(self) -> i64 {
        match self {
            Self::Boss => 200,
            Self::Rare => 250,
            Self::Elite => 300,
            Self::Common => 400,
        }
    }

    /// Width of the block window in milliseconds before the next attack.
    pub fn block_window_ms(self) -> i64 {
        match self {
            Self::Boss => 800,
            Self::Rare => 900,
            Self::Elite => 1000,
            Self::Common => 1200,
        }
    }
}

/// A monster instance alive inside one combat event.
///
/// # Invariants
///
/// - `current_health <= max_health`
/// - `attack_interval_ms > 0`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub template_id: MonsterTemplateId,
    pub name: String,
    pub current_health: u32,
    pub max_health: u32,
    pub attack: u32,
    pub defense: u32,
    pub rarity: Rarity,
    pub attack_interval_ms: i64,
    /// Wall-clock instant of this actor's next scheduled swing.
    pub next_attack_at: DateTime<Utc>,
}

impl ActorSnapshot {
    pub fn is_alive(&self) -> bool {
        self.current_health > 0
    }

    /// Apply damage, clamped so health never goes below zero.
    /// Returns the amount actually subtracted.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let dealt = amount.min(self.current_health);
        self.current_health -= dealt;
        dealt
    }

    /// Push the next swing one full interval past `now`.
    pub fn reschedule_attack(&mut self, now: DateTime<Utc>) {
        self.next_attack_at = now + chrono::Duration::milliseconds(self.attack_interval_ms);
    }
}
