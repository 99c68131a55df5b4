pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod grader;
pub mod sandbox;

pub use config::EngineConfig;
pub use engine::QuestEngine;
pub use error::{EngineError, Result};
pub use sandbox::{ConfiguredBackend, IsolationBackend};
