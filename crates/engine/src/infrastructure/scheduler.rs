//! Background loops: the combat tick and the maintenance sweep.
//!
//! The tick loop lands due monster swings and collapses event timeouts;
//! the sweep loop expires overdue sessions, collapses overdue loot rolls,
//! and deletes terminal sessions past their cleanup grace. Each item is
//! handled independently so one bad session never stalls the rest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::infrastructure::ports::{ClockPort, SessionRepo};
use crate::infrastructure::settings::EngineSettings;
use crate::use_cases::loot::LootUseCases;
use crate::use_cases::session::SessionUseCases;

pub struct Scheduler {
    sessions: Arc<dyn SessionRepo>,
    session_uc: Arc<SessionUseCases>,
    loot_uc: Arc<LootUseCases>,
    clock: Arc<dyn ClockPort>,
    settings: EngineSettings,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        sessions: Arc<dyn SessionRepo>,
        session_uc: Arc<SessionUseCases>,
        loot_uc: Arc<LootUseCases>,
        clock: Arc<dyn ClockPort>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sessions,
            session_uc,
            loot_uc,
            clock,
            settings,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the tick and sweep loops. A second call while running is a
    /// no-op and returns no handles.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("scheduler already running");
            return Vec::new();
        }
        tracing::info!(
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            sweep_ms = self.settings.sweep_interval.as_millis() as u64,
            "starting scheduler"
        );

        let tick = {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                while scheduler.running.load(Ordering::SeqCst) {
                    tokio::time::sleep(scheduler.settings.tick_interval).await;
                    scheduler.session_uc.tick_all().await;
                }
                tracing::info!("tick loop stopped");
            })
        };
        let sweep = {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                while scheduler.running.load(Ordering::SeqCst) {
                    tokio::time::sleep(scheduler.settings.sweep_interval).await;
                    scheduler.sweep_once().await;
                }
                tracing::info!("sweep loop stopped");
            })
        };
        vec![tick, sweep]
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// One maintenance pass: expiry, roll collapse, cleanup.
    pub async fn sweep_once(&self) {
        let now = self.clock.now();

        match self.sessions.list_active_expired(now).await {
            Ok(expired) => {
                for session_id in expired {
                    if let Err(e) = self.session_uc.check_expiry(session_id).await {
                        tracing::error!(%session_id, "expiry check failed: {e}");
                    }
                }
            }
            Err(e) => tracing::error!("failed to list expired sessions: {e}"),
        }

        if let Err(e) = self.loot_uc.collapse_due_rolls().await {
            tracing::error!("roll collapse failed: {e}");
        }

        let cutoff = now - chrono::Duration::milliseconds(self.settings.cleanup_grace_ms);
        match self.sessions.list_terminal_before(cutoff).await {
            Ok(stale) => {
                for session_id in stale {
                    match self.session_uc.cleanup_session(session_id).await {
                        Ok(()) => self.session_uc.forget_lock(session_id),
                        Err(e) => tracing::error!(%session_id, "cleanup failed: {e}"),
                    }
                }
            }
            Err(e) => tracing::error!("failed to list stale sessions: {e}"),
        }
    }
}
