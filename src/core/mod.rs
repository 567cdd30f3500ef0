pub mod bootstrap;
pub mod error;
pub mod events;
pub mod launcher;
pub mod model;
pub mod orchestrator;
