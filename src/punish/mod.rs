//! Enactment and revocation engines
//!
//! Every change to whether a punishment is active goes through [`Enactor`]
//! or [`RevocationOrder`].

mod enactor;
mod events;
mod options;
mod revoker;

pub use enactor::Enactor;
pub use events::{NoopEvents, PardonEvent, PardonTarget, PunishEvent, PunishmentEvents};
pub use options::{Broadcasting, Enforcement, EnforcementOptions, EnforcementOptionsBuilder};
pub use revoker::{PunishmentRevoker, RevocationOrder};

#[cfg(test)]
pub use events::MockPunishmentEvents;
