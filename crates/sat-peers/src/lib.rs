//! Peer connection manager for tracker-signaled direct sessions.
//!
//! A [`PeerManager`] defers connects until it has an identity, keeps the
//! authoritative registry of remote peers, drives the offer/answer
//! handshake through [`sat_signal`], and publishes every state change as a
//! [`PeerEvent`].
//!
//! Peer states follow a fixed graph:
//!
//! ```text
//! Discovered → Connecting → Connected → Closed
//!                   ↘ Failed ↗
//! ```
//!
//! A `connect` for a Failed or Closed peer retires the old record and
//! starts a fresh cycle.

mod backoff;
mod config;
mod error;
mod events;
mod lifecycle;
mod manager;
mod queue;
mod registry;
mod session;
mod stats;
mod types;

pub use backoff::{Backoff, RetryPolicy};
pub use config::ManagerConfig;
pub use error::{FailureReason, PeerError};
pub use events::{EventEmitter, HandlerError, PeerEvent, SubscriptionId, Topic};
pub use manager::PeerManager;
pub use queue::{PendingCommand, PendingQueue};
pub use registry::PeerRegistry;
pub use session::{
    NegotiationError, SessionFactory, SignalOnlyFactory, SignalOnlySession, TransportSession,
};
pub use stats::ManagerStats;
pub use types::{PeerOrigin, PeerSnapshot, PeerState, SessionId, Stage};
