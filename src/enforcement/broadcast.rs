//! Network broadcast boundary
//!
//! Transport to other servers is owned by the host platform; this module
//! only defines what is sent.

use async_trait::async_trait;
use derive_more::Display;
use tracing::info;

use super::EnforcementResult;
use crate::ENFORCEMENT_TARGET;
use crate::model::Punishment;

/// What happened to a punishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Change {
    #[display("enacted")]
    Enacted,
    #[display("revoked")]
    Revoked,
}

/// An announcement of a punishment change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub punishment: Punishment,
    pub change: Change,
    /// Staff-only announcement
    pub silent: bool,
    /// The target as the invoker typed it
    pub target_argument: Option<String>,
}

/// Reaches the other servers of the network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Ask other servers to apply a change to their own connections
    async fn synchronize(&self, punishment: &Punishment, change: Change) -> EnforcementResult<()>;

    async fn announce(&self, announcement: &Announcement) -> EnforcementResult<()>;
}

/// Broadcaster for a single-server deployment: announcements go to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBroadcaster;

#[async_trait]
impl Broadcaster for LocalBroadcaster {
    async fn synchronize(&self, _punishment: &Punishment, _change: Change) -> EnforcementResult<()> {
        Ok(())
    }

    async fn announce(&self, announcement: &Announcement) -> EnforcementResult<()> {
        let punishment = &announcement.punishment;
        info!(
            target: ENFORCEMENT_TARGET,
            punishment_id = punishment.id,
            punishment_type = %punishment.punishment_type,
            change = %announcement.change,
            silent = announcement.silent,
            target_argument = announcement.target_argument.as_deref().unwrap_or_default(),
            reason = %punishment.reason,
            "{} {} {}",
            punishment.victim,
            announcement.change,
            punishment.punishment_type
        );
        Ok(())
    }
}
