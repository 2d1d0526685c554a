//! Use case orchestration over the domain aggregates.

pub mod event;
pub mod loot;
pub mod session;

pub use event::{EventError, EventOps};
pub use loot::{LootError, LootUseCases};
pub use session::{SessionError, SessionUseCases};
