//! Static mission and event configuration.
//!
//! Loaded from the data store once per session start and treated as
//! immutable at runtime. A mission is a bag of weighted event templates;
//! the selector in `crate::selection` draws from it.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{EventTemplateId, ItemId, MissionId, MonsterTemplateId};

/// Difficulty tier of a mission, scaling xp payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifficultyTier {
    Normal,
    Hard,
    Nightmare,
}

impl DifficultyTier {
    /// Experience awarded per resolved event at this tier.
    pub fn xp_per_event(self) -> u64 {
        match self {
            Self::Normal => 50,
            Self::Hard => 90,
            Self::Nightmare => 150,
        }
    }
}

/// One (event template, weight) pair in a mission's event pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedEntry {
    pub template_id: EventTemplateId,
    pub weight: u32,
}

/// Static mission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionTemplate {
    id: MissionId,
    name: String,
    events: Vec<WeightedEntry>,
    tier: DifficultyTier,
    /// Base run deadline in milliseconds.
    time_limit_ms: i64,
    /// How many events a single run may resolve before completing.
    event_budget: u32,
}

impl MissionTemplate {
    /// Build a mission, validating its event pool.
    ///
    /// Weights must be >= 1 and a template may appear at most once.
    pub fn new(
        name: impl Into<String>,
        events: Vec<WeightedEntry>,
        tier: DifficultyTier,
        time_limit_ms: i64,
        event_budget: u32,
    ) -> Result<Self, DomainError> {
        if events.is_empty() {
            return Err(DomainError::configuration("mission has no event templates"));
        }
        for entry in &events {
            if entry.weight == 0 {
                return Err(DomainError::configuration(format!(
                    "template {} has zero weight",
                    entry.template_id
                )));
            }
        }
        for (i, entry) in events.iter().enumerate() {
            if events[i + 1..].iter().any(|e| e.template_id == entry.template_id) {
                return Err(DomainError::configuration(format!(
                    "template {} listed twice",
                    entry.template_id
                )));
            }
        }
        if time_limit_ms <= 0 {
            return Err(DomainError::configuration("time limit must be positive"));
        }
        Ok(Self {
            id: MissionId::new(),
            name: name.into(),
            events,
            tier,
            time_limit_ms,
            event_budget,
        })
    }

    #[inline]
    pub fn id(&self) -> MissionId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn events(&self) -> &[WeightedEntry] {
        &self.events
    }

    #[inline]
    pub fn tier(&self) -> DifficultyTier {
        self.tier
    }

    #[inline]
    pub fn time_limit_ms(&self) -> i64 {
        self.time_limit_ms
    }

    #[inline]
    pub fn event_budget(&self) -> u32 {
        self.event_budget
    }
}

/// Kind of dungeon event. Closed set; resolution behavior dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Combat,
    Treasure,
    Trap,
    Puzzle,
    Choice,
    Rest,
    Boss,
}

impl EventKind {
    pub fn is_combat(self) -> bool {
        matches!(self, Self::Combat | Self::Boss)
    }
}

/// Base stats for a monster that can spawn in a combat event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonsterTemplate {
    pub id: MonsterTemplateId,
    pub name: String,
    pub health: u32,
    pub attack: u32,
    pub defense: u32,
    /// Attack interval = 4000 ms / attack_speed.
    pub attack_speed: f32,
}

/// Spawn configuration for COMBAT/BOSS events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRules {
    pub monsters: Vec<MonsterTemplate>,
    pub min_count: u32,
    pub max_count: u32,
    /// Chance in percent that a spawned monster is upgraded to elite.
    pub elite_chance: u32,
    /// Chance in percent that a spawned monster is upgraded to rare.
    pub rare_chance: u32,
}

/// One item entry in a loot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootEntry {
    pub item_id: ItemId,
    pub quantity: u32,
    /// Drop chance in percent, 1..=100.
    pub chance: u32,
}

/// Items plus a currency range dropped by an event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LootTable {
    pub entries: Vec<LootEntry>,
    pub currency_min: u64,
    pub currency_max: u64,
}

/// Kind-specific payload carried by an event template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Combat { spawn: SpawnRules, loot: LootTable },
    Treasure { loot: LootTable },
    Trap { damage: u32 },
    Puzzle { options: Vec<String>, reward: LootTable },
    Choice { options: Vec<String> },
    Rest { heal_percent: u8 },
    Boss { spawn: SpawnRules, loot: LootTable },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Combat { .. } => EventKind::Combat,
            Self::Treasure { .. } => EventKind::Treasure,
            Self::Trap { .. } => EventKind::Trap,
            Self::Puzzle { .. } => EventKind::Puzzle,
            Self::Choice { .. } => EventKind::Choice,
            Self::Rest { .. } => EventKind::Rest,
            Self::Boss { .. } => EventKind::Boss,
        }
    }
}

/// Static event configuration referenced by missions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTemplate {
    id: EventTemplateId,
    name: String,
    payload: EventPayload,
    /// Optional per-event resolution timeout in milliseconds; the engine
    /// default applies when absent.
    timeout_ms: Option<i64>,
}

impl EventTemplate {
    pub fn new(name: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: EventTemplateId::new(),
            name: name.into(),
            payload,
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    #[inline]
    pub fn id(&self) -> EventTemplateId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    #[inline]
    pub fn timeout_ms(&self) -> Option<i64> {
        self.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(weight: u32) -> WeightedEntry {
        WeightedEntry {
            template_id: EventTemplateId::new(),
            weight,
        }
    }

    #[test]
    fn new_mission_validates_pool() {
        let mission = MissionTemplate::new(
            "Crypt of Ash",
            vec![entry(3), entry(1)],
            DifficultyTier::Normal,
            600_000,
            8,
        )
        .unwrap();
        assert_eq!(mission.events().len(), 2);
        assert_eq!(mission.tier().xp_per_event(), 50);
    }

    #[test]
    fn zero_weight_is_rejected() {
        let err = MissionTemplate::new(
            "Bad",
            vec![entry(0)],
            DifficultyTier::Normal,
            600_000,
            8,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn duplicate_template_is_rejected() {
        let e = entry(2);
        let err = MissionTemplate::new(
            "Bad",
            vec![e, e],
            DifficultyTier::Normal,
            600_000,
            8,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err =
            MissionTemplate::new("Bad", vec![], DifficultyTier::Normal, 600_000, 8).unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn boss_counts_as_combat() {
        assert!(EventKind::Boss.is_combat());
        assert!(!EventKind::Treasure.is_combat());
    }
}
