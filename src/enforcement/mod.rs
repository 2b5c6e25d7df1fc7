//! Enforcement system
//!
//! Decides what enacting or revoking a punishment does to live connections
//! and to the rest of the network. Persistence never waits on this module
//! succeeding; the engines in [`crate::punish`] log its failures.

mod broadcast;
mod connections;
mod error;
mod handler;
mod service;

pub use broadcast::{Announcement, Broadcaster, Change, LocalBroadcaster};
pub use connections::{ConnectionMessage, ConnectionRegistry, PlayerConnection};
pub use error::{EnforcementError, EnforcementResult};
pub use handler::{ActionHandler, ActionHandlerRegistry};
pub use service::{EnforcementDispatcher, EnforcementRequest, EnforcementService, Enforcer};

#[cfg(test)]
pub use broadcast::MockBroadcaster;
#[cfg(test)]
pub use service::MockEnforcer;
