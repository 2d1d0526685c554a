//! Delve domain - dungeon mission types, aggregates, and invariants.
//!
//! Pure domain logic: no async, no I/O, no direct RNG. Randomness enters
//! through injected closures (see [`selection`]) so every decision is
//! reproducible in tests.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod events;
pub mod ids;
pub mod progression;
pub mod selection;
pub mod timing;

pub use aggregates::{
    DungeonEvent, DungeonLoot, DungeonSession, EventStatus, LootMode, LootRoll, LootStatus,
    RollKind, SessionStats, SessionStatus,
};
pub use entities::{
    ActionKind, ActorSnapshot, DifficultyTier, EventKind, EventPayload, EventTemplate, LootEntry,
    LootTable, MissionTemplate, MonsterTemplate, PartyMember, PlayerAction, Rarity, SpawnRules,
    TimingGrade, WeightedEntry,
};
pub use error::DomainError;
pub use events::EngineEvent;
pub use ids::{
    ActorId, CharacterId, DungeonEventId, EventTemplateId, ItemId, LootId, MissionId,
    MonsterTemplateId, SessionId,
};
pub use selection::select_next;
pub use timing::{classify, AttackTiming, ReactionWindow};
