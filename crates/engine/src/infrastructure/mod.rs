//! Infrastructure: ports plus their concrete adapters.

pub mod clock;
pub mod locks;
pub mod memory;
pub mod ports;
pub mod publisher;
pub mod scheduler;
pub mod settings;
pub mod spawner;
