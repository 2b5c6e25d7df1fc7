//! Punishment events
//!
//! Collaborators get a say before a punishment is enacted or revoked, and
//! hear about it afterwards. Pre-events may cancel the operation; an event
//! that does not answer within the configured timeout counts as cancelled.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::PUNISH_TARGET;
use crate::model::{DraftPunishment, Operator, Punishment, PunishmentType, Victim};

/// What a pardon is aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PardonTarget {
    Id(i64),
    /// Any active punishment overlapping one of these candidates
    Victims(Vec<Victim>),
}

/// Fired before a draft is enacted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunishEvent {
    pub draft: DraftPunishment,
}

/// Fired before a revocation is committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PardonEvent {
    pub operator: Operator,
    pub punishment_type: PunishmentType,
    pub target: PardonTarget,
}

/// Receiver of punishment events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PunishmentEvents: Send + Sync {
    /// Returns `true` to cancel the enactment
    async fn on_punish(&self, event: &PunishEvent) -> bool;

    async fn after_punish(&self, punishment: &Punishment);

    /// Returns `true` to cancel the revocation
    async fn on_pardon(&self, event: &PardonEvent) -> bool;

    async fn after_pardon(&self, punishment: &Punishment);
}

/// Events nobody listens to
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

#[async_trait]
impl PunishmentEvents for NoopEvents {
    async fn on_punish(&self, _event: &PunishEvent) -> bool {
        false
    }

    async fn after_punish(&self, _punishment: &Punishment) {}

    async fn on_pardon(&self, _event: &PardonEvent) -> bool {
        false
    }

    async fn after_pardon(&self, _punishment: &Punishment) {}
}

/// Await a cancellable event, treating a timeout as cancellation
pub(crate) async fn is_cancelled(
    timeout: Duration,
    name: &str,
    event: impl Future<Output = bool>,
) -> bool {
    tokio::time::timeout(timeout, event).await.unwrap_or_else(|_| {
        warn!(target: PUNISH_TARGET, event = %name, timeout_ms = %timeout.as_millis(), "Event timed out, assuming cancelled");
        true
    })
}

/// Await a notification event; a timeout is logged and otherwise ignored
pub(crate) async fn notify(timeout: Duration, name: &str, event: impl Future<Output = ()>) {
    if tokio::time::timeout(timeout, event).await.is_err() {
        warn!(target: PUNISH_TARGET, event = %name, timeout_ms = %timeout.as_millis(), "Post event timed out");
    }
}
