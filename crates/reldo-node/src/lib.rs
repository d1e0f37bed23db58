//! Host side of the Reldo escrow engine: TOML configuration, logging setup,
//! scripted scenarios and event log replay.

pub mod config;
pub mod logging;
pub mod replay;
pub mod scenario;

pub use config::{AccountSeed, EngineSection, LoggingConfig, NodeConfig, DEFAULT_CONFIG_FILE};
pub use scenario::{Action, Scenario, ScenarioReport, ScenarioRunner, ScenarioStep};
