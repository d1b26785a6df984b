//! Cross-device session layer.
//!
//! The wearable runs a [`SessionCoordinator`] behind a [`WearableService`];
//! the companion runs a [`RemoteListener`] and a [`CompanionController`].
//! Both talk through a [`ChannelTransport`].

pub mod channel;
pub mod control;
pub mod coordinator;
pub mod listener;
pub mod memory;
pub mod ui;

// Re-export commonly used types
pub use channel::{
    Channel, ChannelPath, ChannelTransport, ControlMessage, InboundEvent, NodeInfo, TransportError,
};
pub use control::{CompanionController, ControlOutcome, WearableService};
pub use coordinator::{
    CoordinatorSettings, PipelineFactory, SessionCoordinator, SessionError, SessionPhase,
    SessionReport, SessionState, StopReport,
};
pub use listener::{Received, RemoteListener};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use ui::{UiSink, UiSnapshot, UiState};
