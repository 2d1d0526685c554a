//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    clock::{SystemClock, SystemRandom},
    locks::SessionLocks,
    memory::{
        InMemoryCharacterRepo, InMemoryEventRepo, InMemoryLootRepo, InMemoryMissionRepo,
        InMemorySessionRepo,
    },
    ports::{CharacterRepo, ClockPort, EventRepo, LootRepo, MissionRepo, RandomPort, SessionRepo},
    publisher::BroadcastPublisher,
    scheduler::Scheduler,
    settings::EngineSettings,
    spawner::RosterSpawner,
};
use crate::use_cases::{EventOps, LootUseCases, SessionUseCases};

/// Main application state.
///
/// Holds the repository ports, the use cases wired over them, and the
/// background scheduler. The transport layer gets its realtime feed from
/// [`App::subscribe`].
pub struct App {
    pub repositories: Repositories,
    pub use_cases: UseCases,
    pub scheduler: Arc<Scheduler>,
    publisher: Arc<BroadcastPublisher>,
}

/// Container for the repository ports.
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepo>,
    pub events: Arc<dyn EventRepo>,
    pub loot: Arc<dyn LootRepo>,
    pub missions: Arc<dyn MissionRepo>,
    pub characters: Arc<dyn CharacterRepo>,
}

/// Container for the use cases.
pub struct UseCases {
    pub session: Arc<SessionUseCases>,
    pub loot: Arc<LootUseCases>,
}

impl App {
    /// Compose the engine over the given repositories with the system
    /// clock and system randomness.
    pub fn new(repositories: Repositories, settings: EngineSettings) -> Self {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
        let random: Arc<dyn RandomPort> = Arc::new(SystemRandom::new());
        let publisher = Arc::new(BroadcastPublisher::new(settings.publish_capacity));
        let locks = Arc::new(SessionLocks::new());
        let spawner = Arc::new(RosterSpawner::new(random.clone(), settings.stagger_max_ms));

        let event_ops = EventOps::new(
            repositories.missions.clone(),
            spawner,
            publisher.clone(),
            random.clone(),
            settings.clone(),
        );
        let loot = Arc::new(LootUseCases::new(
            repositories.loot.clone(),
            repositories.sessions.clone(),
            repositories.characters.clone(),
            publisher.clone(),
            clock.clone(),
            random.clone(),
            locks.clone(),
            settings.clone(),
        ));
        let session = Arc::new(SessionUseCases::new(
            repositories.sessions.clone(),
            repositories.events.clone(),
            repositories.missions.clone(),
            repositories.characters.clone(),
            repositories.loot.clone(),
            publisher.clone(),
            clock.clone(),
            locks,
            event_ops,
            loot.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            repositories.sessions.clone(),
            session.clone(),
            loot.clone(),
            clock,
            settings,
        ));

        Self {
            repositories,
            use_cases: UseCases { session, loot },
            scheduler,
            publisher,
        }
    }

    /// Compose the engine over the in-memory adapters.
    pub fn in_memory(settings: EngineSettings) -> Self {
        Self::new(
            Repositories {
                sessions: Arc::new(InMemorySessionRepo::new()),
                events: Arc::new(InMemoryEventRepo::new()),
                loot: Arc::new(InMemoryLootRepo::new()),
                missions: Arc::new(InMemoryMissionRepo::new()),
                characters: Arc::new(InMemoryCharacterRepo::new()),
            },
            settings,
        )
    }

    /// Realtime engine event feed for the transport layer.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<delve_domain::EngineEvent> {
        self.publisher.subscribe()
    }
}
