//! Control node and closed-loop demo around the racing MPC

pub mod config;
pub mod error;
pub mod node;

pub use config::{AppConfig, TrackConfig};
pub use error::AppError;
pub use node::{NodeState, NodeStats, RacingNode};
