//! Enactment engine
//!
//! Turns drafts into persisted punishments. The store decides conflicts
//! atomically; enforcement only ever follows a successful commit.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::events::{PunishEvent, PunishmentEvents, is_cancelled, notify};
use super::EnforcementOptions;
use crate::PUNISH_TARGET;
use crate::database::PunishmentStore;
use crate::enforcement::Enforcer;
use crate::error::PunishmentResult;
use crate::logging::{log_cancelled, log_conflict, log_enacted, log_enforcement_failure};
use crate::model::{DraftPunishment, Punishment};

/// Enacts draft punishments
#[derive(Clone)]
pub struct Enactor {
    store: Arc<dyn PunishmentStore>,
    enforcer: Arc<dyn Enforcer>,
    events: Arc<dyn PunishmentEvents>,
    event_timeout: Duration,
}

impl Enactor {
    #[must_use]
    pub fn new(
        store: Arc<dyn PunishmentStore>,
        enforcer: Arc<dyn Enforcer>,
        events: Arc<dyn PunishmentEvents>,
        event_timeout: Duration,
    ) -> Self {
        Self {
            store,
            enforcer,
            events,
            event_timeout,
        }
    }

    /// Persist a draft, then enforce it.
    ///
    /// Returns `None` on conflict or cancellation. A failed enforcement is
    /// logged; the punishment stays committed and is still returned.
    ///
    /// # Errors
    /// Returns a `Storage` error if persistence fails
    pub async fn enact_punishment(
        &self,
        draft: &DraftPunishment,
        options: &EnforcementOptions,
    ) -> PunishmentResult<Option<Punishment>> {
        let Some(punishment) = self.enact_punishment_without_enforcement(draft).await? else {
            return Ok(None);
        };
        if let Err(e) = self.enforcer.enforce(&punishment, options).await {
            log_enforcement_failure(&punishment, "enforce", &e);
        }
        Ok(Some(punishment))
    }

    /// Persist a draft without touching live connections
    ///
    /// # Errors
    /// Returns a `Storage` error if persistence fails
    pub async fn enact_punishment_without_enforcement(
        &self,
        draft: &DraftPunishment,
    ) -> PunishmentResult<Option<Punishment>> {
        let event = PunishEvent { draft: draft.clone() };
        if is_cancelled(self.event_timeout, "punish", self.events.on_punish(&event)).await {
            log_cancelled("punish", draft.punishment_type());
            return Ok(None);
        }

        debug!(target: PUNISH_TARGET, punishment_type = %draft.punishment_type(), victim = %draft.victim(), "Enacting draft");
        let Some(punishment) = self.store.enact(draft).await? else {
            log_conflict(draft.punishment_type(), draft.victim());
            return Ok(None);
        };
        log_enacted(&punishment);

        notify(self.event_timeout, "post_punish", self.events.after_punish(&punishment)).await;
        Ok(Some(punishment))
    }
}
