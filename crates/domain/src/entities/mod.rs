//! Plain domain entities and value types.

pub mod action;
pub mod actor;
pub mod mission;
pub mod party;

pub use action::{ActionKind, PlayerAction, TimingGrade};
pub use actor::{ActorSnapshot, Rarity};
pub use mission::{
    DifficultyTier, EventKind, EventPayload, EventTemplate, LootEntry, LootTable, MissionTemplate,
    MonsterTemplate, SpawnRules, WeightedEntry,
};
pub use party::{select_target, PartyMember};
