//! Aggregate roots of the dungeon mission engine.

pub mod event;
pub mod loot;
pub mod session;

pub use event::{DungeonEvent, EventStatus};
pub use loot::{DungeonLoot, LootRoll, LootStatus, RollKind};
pub use session::{DungeonSession, LootMode, SessionStats, SessionStatus};
