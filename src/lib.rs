//! WatchIt: a local, on-device content-safety monitor.
//!
//! The crate is organized leaf-first: scoring and capability contracts at
//! the bottom, the three analyzer stages above them, the planner and policy
//! engine above that, and the store/replicator/guardian/bus/runner modules
//! wiring everything into the operations an external surface (HTTP, CLI,
//! whatever embeds this crate) would call.

pub mod analyzers;
pub mod bus;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod graph;
pub mod guardian;
pub mod models;
pub mod planner;
pub mod policy;
pub mod replicator;
pub mod runner;
pub mod scorer;
pub mod store;
pub mod telemetry;
pub mod types;

pub use bus::DecisionBus;
pub use config::Config;
pub use guardian::GuardianLearningLoop;
pub use models::{ChildProfile, Decision, DecisionMessage, Event, EventInput};
pub use planner::ChatPlannerAdvisor;
pub use policy::PolicyEngine;
pub use replicator::Replicator;
pub use runner::MonitorApp;
pub use store::SqliteStore;
pub use types::{Action, Category, Strictness};
