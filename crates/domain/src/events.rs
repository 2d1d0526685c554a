//! Engine events published to the transport layer.
//!
//! The engine emits these fire-and-forget; delivery is the transport's
//! problem and never blocks gameplay.

use serde::{Deserialize, Serialize};

use crate::aggregates::session::SessionStats;
use crate::ids::{ActorId, CharacterId, DungeonEventId, ItemId, LootId, SessionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    SessionStarted {
        session_id: SessionId,
        party: Vec<CharacterId>,
    },
    EventActivated {
        session_id: SessionId,
        event_id: DungeonEventId,
        sequence: u32,
    },
    ActionAccepted {
        session_id: SessionId,
        event_id: DungeonEventId,
        character_id: CharacterId,
    },
    ActorAttacked {
        session_id: SessionId,
        event_id: DungeonEventId,
        actor_id: ActorId,
        target: CharacterId,
        damage: u32,
        mitigated: bool,
    },
    EventResolved {
        session_id: SessionId,
        event_id: DungeonEventId,
    },
    SessionCompleted {
        session_id: SessionId,
        stats: SessionStats,
    },
    SessionFailed {
        session_id: SessionId,
    },
    SessionAbandoned {
        session_id: SessionId,
        by: CharacterId,
    },
    LootAvailable {
        session_id: SessionId,
        loot_id: LootId,
        item_id: ItemId,
        quantity: u32,
    },
    LootAssigned {
        session_id: SessionId,
        loot_id: LootId,
        character_id: CharacterId,
    },
    LevelUp {
        character_id: CharacterId,
        level: u32,
    },
}
