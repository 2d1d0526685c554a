//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is
//! concrete types. Ports exist for:
//! - Data store access (in-memory today, could swap to a database)
//! - Monster generation (spawn rules -> actor snapshots)
//! - The realtime publish channel (engine -> transport fan-out)
//! - Clock/Random (for testing)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use delve_domain::{
    ActorSnapshot, CharacterId, DungeonEvent, DungeonEventId, DungeonLoot, DungeonSession,
    EngineEvent, EventTemplate, EventTemplateId, ItemId, LootId, MissionId, MissionTemplate,
    SessionId, SpawnRules,
};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Not found")]
    NotFound,
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Spawn generation failed: {0}")]
    Generation(String),
}

// =============================================================================
// Infrastructure Types
// =============================================================================

/// Combat-relevant character sheet fields, read at session start.
#[derive(Debug, Clone, Copy)]
pub struct CombatantProfile {
    pub max_health: u32,
    pub attack: u32,
    pub defense: u32,
}

// =============================================================================
// Database Ports (one per aggregate)
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn get(&self, id: SessionId) -> Result<Option<DungeonSession>, RepoError>;
    async fn save(&self, session: &DungeonSession) -> Result<(), RepoError>;
    async fn delete(&self, id: SessionId) -> Result<(), RepoError>;

    // Queries
    /// Session currently holding this character, if any (ACTIVE only).
    async fn find_active_for_character(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<SessionId>, RepoError>;
    async fn list_active(&self) -> Result<Vec<SessionId>, RepoError>;
    /// ACTIVE sessions whose deadline is already behind `now`.
    async fn list_active_expired(&self, now: DateTime<Utc>) -> Result<Vec<SessionId>, RepoError>;
    /// Terminal sessions whose terminal instant is older than `cutoff`.
    async fn list_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionId>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn get(&self, id: DungeonEventId) -> Result<Option<DungeonEvent>, RepoError>;
    async fn save(&self, event: &DungeonEvent) -> Result<(), RepoError>;
    async fn delete_for_session(&self, session_id: SessionId) -> Result<(), RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LootRepo: Send + Sync {
    async fn get(&self, id: LootId) -> Result<Option<DungeonLoot>, RepoError>;
    async fn save(&self, loot: &DungeonLoot) -> Result<(), RepoError>;
    async fn list_for_session(&self, session_id: SessionId) -> Result<Vec<DungeonLoot>, RepoError>;
    /// Drops currently collecting rolls (scheduler collapse scan).
    async fn list_rolling(&self) -> Result<Vec<DungeonLoot>, RepoError>;
    async fn delete_for_session(&self, session_id: SessionId) -> Result<(), RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MissionRepo: Send + Sync {
    async fn get_mission(&self, id: MissionId) -> Result<Option<MissionTemplate>, RepoError>;
    async fn get_event_template(
        &self,
        id: EventTemplateId,
    ) -> Result<Option<EventTemplate>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CharacterRepo: Send + Sync {
    async fn get_profile(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<CombatantProfile>, RepoError>;
    async fn grant_item(
        &self,
        character_id: CharacterId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<(), RepoError>;
    async fn grant_currency(&self, character_id: CharacterId, amount: u64)
        -> Result<(), RepoError>;
    /// Add experience; returns the new accumulated total.
    async fn add_experience(
        &self,
        character_id: CharacterId,
        amount: u64,
    ) -> Result<u64, RepoError>;
}

// =============================================================================
// Collaborator Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpawnerPort: Send + Sync {
    /// Roll a combat roster from spawn rules. Each actor comes back with
    /// rarity multipliers applied and `next_attack_at` already staggered
    /// past `now`. `boss` pins every actor to boss rarity instead of
    /// rolling the upgrade chances.
    async fn generate(
        &self,
        rules: &SpawnRules,
        boss: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActorSnapshot>, SpawnError>;
}

/// Realtime fan-out to connected clients. Fire-and-forget: the engine
/// never waits for delivery acknowledgment.
#[cfg_attr(test, mockall::automock)]
pub trait PublisherPort: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[cfg_attr(test, mockall::automock)]
pub trait RandomPort: Send + Sync {
    /// Uniform draw in `[min, max]` (inclusive).
    fn gen_range(&self, min: u64, max: u64) -> u64;
}
