//! Delve Engine library.
//!
//! Server-side runtime for dungeon mission sessions.
//!
//! ## Structure
//!
//! - `use_cases/` - Session, event, and loot orchestration
//! - `infrastructure/` - Ports and adapters (stores, spawner, publisher,
//!   locks, scheduler)
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
