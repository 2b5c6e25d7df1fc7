//! Punishment data model
//!
//! Value types for victims, operators and scopes, plus draft and persisted
//! punishments. Everything here is plain data; the engines that persist and
//! revoke punishments live in [`crate::punish`].

mod draft;
mod operator;
mod punishment;
mod scope;
mod victim;

pub use draft::{DraftPunishment, DraftPunishmentBuilder, MAX_DURATION_SECONDS, draft};
pub use operator::Operator;
pub use punishment::{
    EscalationTrack, Punishment, PunishmentType, Revocation, end_to_epoch_seconds,
    from_epoch_seconds,
};
pub use scope::ServerScope;
pub use victim::{NetworkAddress, Victim, VictimType};
