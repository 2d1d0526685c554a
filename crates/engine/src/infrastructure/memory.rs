//! In-memory data store adapters backed by dashmap.
//!
//! The persistence boundary is the port traits; these adapters keep
//! everything in process memory, which is all the engine needs today and
//! doubles as the fixture set for use-case tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use delve_domain::{
    CharacterId, DungeonEvent, DungeonEventId, DungeonLoot, DungeonSession, EventTemplate,
    EventTemplateId, ItemId, LootId, LootStatus, MissionId, MissionTemplate, SessionId,
    SessionStatus,
};

use crate::infrastructure::ports::{
    CharacterRepo, CombatantProfile, EventRepo, LootRepo, MissionRepo, RepoError, SessionRepo,
};

// =============================================================================
// Sessions
// =============================================================================

#[derive(Default)]
pub struct InMemorySessionRepo {
    sessions: DashMap<SessionId, DungeonSession>,
}

impl InMemorySessionRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepo for InMemorySessionRepo {
    async fn get(&self, id: SessionId) -> Result<Option<DungeonSession>, RepoError> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn save(&self, session: &DungeonSession) -> Result<(), RepoError> {
        self.sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<(), RepoError> {
        self.sessions.remove(&id);
        Ok(())
    }

    async fn find_active_for_character(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<SessionId>, RepoError> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.status() == SessionStatus::Active && s.has_member(character_id))
            .map(|s| s.id()))
    }

    async fn list_active(&self) -> Result<Vec<SessionId>, RepoError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.status() == SessionStatus::Active)
            .map(|s| s.id())
            .collect())
    }

    async fn list_active_expired(&self, now: DateTime<Utc>) -> Result<Vec<SessionId>, RepoError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.status() == SessionStatus::Active && s.is_past_deadline(now))
            .map(|s| s.id())
            .collect())
    }

    async fn list_terminal_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionId>, RepoError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.terminal_at().is_some_and(|t| t < cutoff))
            .map(|s| s.id())
            .collect())
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Default)]
pub struct InMemoryEventRepo {
    events: DashMap<DungeonEventId, DungeonEvent>,
}

impl InMemoryEventRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventRepo for InMemoryEventRepo {
    async fn get(&self, id: DungeonEventId) -> Result<Option<DungeonEvent>, RepoError> {
        Ok(self.events.get(&id).map(|e| e.clone()))
    }

    async fn save(&self, event: &DungeonEvent) -> Result<(), RepoError> {
        self.events.insert(event.id(), event.clone());
        Ok(())
    }

    async fn delete_for_session(&self, session_id: SessionId) -> Result<(), RepoError> {
        self.events.retain(|_, e| e.session_id() != session_id);
        Ok(())
    }
}

// =============================================================================
// Loot
// =============================================================================

#[derive(Default)]
pub struct InMemoryLootRepo {
    loot: DashMap<LootId, DungeonLoot>,
}

impl InMemoryLootRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LootRepo for InMemoryLootRepo {
    async fn get(&self, id: LootId) -> Result<Option<DungeonLoot>, RepoError> {
        Ok(self.loot.get(&id).map(|l| l.clone()))
    }

    async fn save(&self, loot: &DungeonLoot) -> Result<(), RepoError> {
        self.loot.insert(loot.id(), loot.clone());
        Ok(())
    }

    async fn list_for_session(&self, session_id: SessionId) -> Result<Vec<DungeonLoot>, RepoError> {
        Ok(self
            .loot
            .iter()
            .filter(|l| l.session_id() == session_id)
            .map(|l| l.clone())
            .collect())
    }

    async fn list_rolling(&self) -> Result<Vec<DungeonLoot>, RepoError> {
        Ok(self
            .loot
            .iter()
            .filter(|l| l.status() == LootStatus::Rolling)
            .map(|l| l.clone())
            .collect())
    }

    async fn delete_for_session(&self, session_id: SessionId) -> Result<(), RepoError> {
        self.loot.retain(|_, l| l.session_id() != session_id);
        Ok(())
    }
}

// =============================================================================
// Mission configuration
// =============================================================================

#[derive(Default)]
pub struct InMemoryMissionRepo {
    missions: DashMap<MissionId, MissionTemplate>,
    templates: DashMap<EventTemplateId, EventTemplate>,
}

impl InMemoryMissionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mission(&self, mission: MissionTemplate) {
        self.missions.insert(mission.id(), mission);
    }

    pub fn insert_template(&self, template: EventTemplate) {
        self.templates.insert(template.id(), template);
    }
}

#[async_trait]
impl MissionRepo for InMemoryMissionRepo {
    async fn get_mission(&self, id: MissionId) -> Result<Option<MissionTemplate>, RepoError> {
        Ok(self.missions.get(&id).map(|m| m.clone()))
    }

    async fn get_event_template(
        &self,
        id: EventTemplateId,
    ) -> Result<Option<EventTemplate>, RepoError> {
        Ok(self.templates.get(&id).map(|t| t.clone()))
    }
}

// =============================================================================
// Characters
// =============================================================================

#[derive(Debug, Clone, Default)]
struct CharacterRecord {
    profile: Option<CombatantProfile>,
    experience: u64,
    currency: u64,
    items: Vec<(ItemId, u32)>,
}

#[derive(Default)]
pub struct InMemoryCharacterRepo {
    characters: DashMap<CharacterId, CharacterRecord>,
}

impl InMemoryCharacterRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, character_id: CharacterId, profile: CombatantProfile) {
        self.characters.entry(character_id).or_default().profile = Some(profile);
    }

    pub fn currency_of(&self, character_id: CharacterId) -> u64 {
        self.characters
            .get(&character_id)
            .map(|c| c.currency)
            .unwrap_or(0)
    }

    pub fn items_of(&self, character_id: CharacterId) -> Vec<(ItemId, u32)> {
        self.characters
            .get(&character_id)
            .map(|c| c.items.clone())
            .unwrap_or_default()
    }

    pub fn experience_of(&self, character_id: CharacterId) -> u64 {
        self.characters
            .get(&character_id)
            .map(|c| c.experience)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CharacterRepo for InMemoryCharacterRepo {
    async fn get_profile(
        &self,
        character_id: CharacterId,
    ) -> Result<Option<CombatantProfile>, RepoError> {
        Ok(self.characters.get(&character_id).and_then(|c| c.profile))
    }

    async fn grant_item(
        &self,
        character_id: CharacterId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<(), RepoError> {
        self.characters
            .entry(character_id)
            .or_default()
            .items
            .push((item_id, quantity));
        Ok(())
    }

    async fn grant_currency(
        &self,
        character_id: CharacterId,
        amount: u64,
    ) -> Result<(), RepoError> {
        self.characters.entry(character_id).or_default().currency += amount;
        Ok(())
    }

    async fn add_experience(
        &self,
        character_id: CharacterId,
        amount: u64,
    ) -> Result<u64, RepoError> {
        let mut entry = self.characters.entry(character_id).or_default();
        entry.experience += amount;
        Ok(entry.experience)
    }
}
