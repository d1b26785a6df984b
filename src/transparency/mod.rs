//! Transparency module for the Motion Sensor Agent.
//!
//! Tracks what the agent records and transmits so a session can be audited.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
