//! Revocation engine
//!
//! A [`RevocationOrder`] names its target, either a punishment id or a set of
//! victim candidates, and undoes at most one active punishment when run.
//! The store makes the undo itself atomic, so racing orders for the same
//! target see exactly one success.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::EnforcementOptions;
use super::events::{PardonEvent, PardonTarget, PunishmentEvents, is_cancelled, notify};
use crate::PUNISH_TARGET;
use crate::database::{PunishmentStore, UndoRequest};
use crate::enforcement::Enforcer;
use crate::error::{PunishmentError, PunishmentResult};
use crate::logging::{log_cancelled, log_enforcement_failure, log_revoked};
use crate::model::{Operator, Punishment, PunishmentType, Victim};

/// Creates revocation orders
#[derive(Clone)]
pub struct PunishmentRevoker {
    store: Arc<dyn PunishmentStore>,
    enforcer: Arc<dyn Enforcer>,
    events: Arc<dyn PunishmentEvents>,
    event_timeout: Duration,
    default_reason: String,
}

impl PunishmentRevoker {
    #[must_use]
    pub fn new(
        store: Arc<dyn PunishmentStore>,
        enforcer: Arc<dyn Enforcer>,
        events: Arc<dyn PunishmentEvents>,
        event_timeout: Duration,
        default_reason: impl Into<String>,
    ) -> Self {
        Self {
            store,
            enforcer,
            events,
            event_timeout,
            default_reason: default_reason.into(),
        }
    }

    /// Target one punishment by id, constrained to `punishment_type`
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error for a non-positive id
    pub fn revoke_by_id_and_type(
        &self,
        id: i64,
        punishment_type: PunishmentType,
    ) -> PunishmentResult<RevocationOrder> {
        if id <= 0 {
            return Err(PunishmentError::invalid(format!("invalid punishment id {id}")));
        }
        Ok(self.order(punishment_type, PardonTarget::Id(id)))
    }

    /// Target whichever active punishment overlaps one of `victims`
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error if no candidate is given
    pub fn revoke_by_type_and_possible_victims(
        &self,
        punishment_type: PunishmentType,
        victims: Vec<Victim>,
    ) -> PunishmentResult<RevocationOrder> {
        if victims.is_empty() {
            return Err(PunishmentError::invalid("at least one victim candidate is required"));
        }
        Ok(self.order(punishment_type, PardonTarget::Victims(victims)))
    }

    /// Target a victim directly or through its composite wildcard
    #[must_use]
    pub fn revoke_by_type_and_victim(&self, punishment_type: PunishmentType, victim: Victim) -> RevocationOrder {
        let wildcard = victim.composite_wildcard();
        let victims = if wildcard == victim {
            vec![victim]
        } else {
            vec![victim, wildcard]
        };
        self.order(punishment_type, PardonTarget::Victims(victims))
    }

    fn order(&self, punishment_type: PunishmentType, target: PardonTarget) -> RevocationOrder {
        RevocationOrder {
            revoker: self.clone(),
            punishment_type,
            target,
            operator: None,
            reason: None,
        }
    }
}

/// A pending revocation
#[derive(Clone)]
pub struct RevocationOrder {
    revoker: PunishmentRevoker,
    punishment_type: PunishmentType,
    target: PardonTarget,
    operator: Option<Operator>,
    reason: Option<String>,
}

impl RevocationOrder {
    /// Who performs the undo
    #[must_use]
    pub const fn undone_by(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    #[must_use]
    pub fn undo_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub const fn punishment_type(&self) -> PunishmentType {
        self.punishment_type
    }

    #[must_use]
    pub const fn target(&self) -> &PardonTarget {
        &self.target
    }

    /// Undo and unenforce; `true` if a punishment was revoked
    ///
    /// # Errors
    /// Returns a `Storage` error if the undo fails, or `InvalidArgument` for a
    /// player operator with the nil UUID
    pub async fn undo_punishment(&self, options: &EnforcementOptions) -> PunishmentResult<bool> {
        Ok(self.undo_and_get_punishment(options).await?.is_some())
    }

    /// Undo and unenforce, returning the revoked punishment.
    ///
    /// A failed unenforcement is logged; the revocation stays committed.
    ///
    /// # Errors
    /// Returns a `Storage` error if the undo fails, or `InvalidArgument` for a
    /// player operator with the nil UUID
    pub async fn undo_and_get_punishment(
        &self,
        options: &EnforcementOptions,
    ) -> PunishmentResult<Option<Punishment>> {
        let Some(punishment) = self.undo(options.un_operator()).await? else {
            return Ok(None);
        };
        if let Err(e) = self.revoker.enforcer.unenforce(&punishment, options).await {
            log_enforcement_failure(&punishment, "unenforce", &e);
        }
        Ok(Some(punishment))
    }

    /// Undo without lifting the punishment's effect on live connections
    ///
    /// # Errors
    /// Returns a `Storage` error if the undo fails, or `InvalidArgument` for a
    /// player operator with the nil UUID
    pub async fn undo_and_get_punishment_without_unenforcement(&self) -> PunishmentResult<Option<Punishment>> {
        self.undo(None).await
    }

    async fn undo(&self, un_operator: Option<Operator>) -> PunishmentResult<Option<Punishment>> {
        let revoker = &self.revoker;
        let request = UndoRequest {
            operator: self.operator.or(un_operator).unwrap_or_default(),
            reason: self.reason.clone().unwrap_or_else(|| revoker.default_reason.clone()),
        };
        request.operator.validate()?;

        let event = PardonEvent {
            operator: request.operator,
            punishment_type: self.punishment_type,
            target: self.target.clone(),
        };
        if is_cancelled(revoker.event_timeout, "pardon", revoker.events.on_pardon(&event)).await {
            log_cancelled("pardon", self.punishment_type);
            return Ok(None);
        }

        let revoked = match &self.target {
            PardonTarget::Id(id) => {
                revoker
                    .store
                    .undo_by_id(*id, self.punishment_type, &request)
                    .await?
            }
            PardonTarget::Victims(victims) => self.undo_any(victims, &request).await?,
        };
        let Some(punishment) = revoked else {
            debug!(target: PUNISH_TARGET, punishment_type = %self.punishment_type, target = ?self.target, "Nothing to revoke");
            return Ok(None);
        };
        log_revoked(&punishment);

        notify(revoker.event_timeout, "post_pardon", revoker.events.after_pardon(&punishment)).await;
        Ok(Some(punishment))
    }

    /// Revoke the first candidate that is still active when its undo runs.
    /// Punishments keyed to one of the victims exactly are tried first.
    async fn undo_any(&self, victims: &[Victim], request: &UndoRequest) -> PunishmentResult<Option<Punishment>> {
        let mut candidates = self
            .revoker
            .store
            .find_active_overlapping(self.punishment_type, victims)
            .await?;
        candidates.sort_by_key(|candidate| !victims.contains(&candidate.victim));

        for candidate in candidates {
            if let Some(punishment) = self
                .revoker
                .store
                .undo_by_id(candidate.id, self.punishment_type, request)
                .await?
            {
                return Ok(Some(punishment));
            }
        }
        Ok(None)
    }
}
