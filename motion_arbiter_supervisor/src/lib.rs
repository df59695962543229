//! motion_arbiter_supervisor
//!
//! Runtime owner of the MRM escalation engine from `motion_arbiter_core`:
//! - latest-value snapshot store written by asynchronous producers
//! - periodic emergency handler tick
//! - behavior service clients with bounded waits
//! - raw message adapters and YAML parameters
//!
//! The handler never spawns threads; the host drives `on_timer` (or `run`).

pub mod adapter;
pub mod behavior;
pub mod clock;
pub mod handler;
pub mod params;
pub mod store;

pub use adapter::{
    apply_batch, apply_message, BehaviorStatusMsg, ControlModeMsg, GearMsg, HandlerMessages,
    HazardLightsMsg, HazardStatusMsg, InboundMessage, MrmStateMsg, OdometryMsg, SignalMessages,
    TurnIndicatorsMsg,
};
pub use behavior::{
    ChannelBehaviorClient, MrmBehaviorClient, OperateMrmRequest, OperateMrmResponse, ServiceCall,
    ServiceError,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use handler::{EmergencyHandler, HandlerOutput, HandlerSnapshot, PendingCall};
pub use params::ArbiterParams;
pub use store::{HazardSnapshot, HazardSnapshotStore};
