// Core modules
pub mod config;
pub mod error;
pub mod indicators;
pub mod models;
pub mod policy;
pub mod strategy;

// Re-export commonly used types
pub use config::PolicyConfig;
pub use error::{ConfigError, PolicyError, Result};
pub use models::*;
pub use policy::{AveragingDecision, AveragingPolicy, SizingDecision, StopLevel, TickDecision};
pub use strategy::Strategy;
