use std::ops::Deref;
use std::sync::Arc;

use crate::config::EnforcementConfig;
use crate::database::PunishmentStore;
use crate::enforcement::Enforcer;
use crate::error::PunishmentResult;
use crate::model::{DraftPunishment, DraftPunishmentBuilder, Punishment};
use crate::punish::{Enactor, EnforcementOptions, PunishmentEvents, PunishmentRevoker};
use crate::select::{PunishmentStream, SelectionOrder, SelectionOrderBuilder};

/// Entry point to the punishment engines, cheap to clone
#[derive(Clone)]
pub struct PunishmentCenter(pub Arc<CenterInner>);

pub struct CenterInner {
    store: Arc<dyn PunishmentStore>,
    enactor: Enactor,
    revoker: PunishmentRevoker,
}

impl std::fmt::Debug for PunishmentCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PunishmentCenter")
            .field("capabilities", self.store.capabilities())
            .finish_non_exhaustive()
    }
}

impl Deref for PunishmentCenter {
    type Target = CenterInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PunishmentCenter {
    /// Wire the engines to one store, enforcer and set of event listeners
    #[must_use]
    pub fn new(
        store: Arc<dyn PunishmentStore>,
        enforcer: Arc<dyn Enforcer>,
        events: Arc<dyn PunishmentEvents>,
        config: &EnforcementConfig,
    ) -> Self {
        let enactor = Enactor::new(
            Arc::clone(&store),
            Arc::clone(&enforcer),
            Arc::clone(&events),
            config.event_timeout(),
        );
        let revoker = PunishmentRevoker::new(
            Arc::clone(&store),
            enforcer,
            events,
            config.event_timeout(),
            config.default_undo_reason.clone(),
        );
        Self(Arc::new(CenterInner {
            store,
            enactor,
            revoker,
        }))
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn PunishmentStore> {
        Arc::clone(&self.0.store)
    }

    #[must_use]
    pub fn enactor(&self) -> &Enactor {
        &self.0.enactor
    }

    #[must_use]
    pub fn revoker(&self) -> &PunishmentRevoker {
        &self.0.revoker
    }

    #[must_use]
    pub fn draft_builder(&self) -> DraftPunishmentBuilder {
        DraftPunishment::builder()
    }

    #[must_use]
    pub fn selection_builder(&self) -> SelectionOrderBuilder {
        SelectionOrder::builder()
    }

    /// Enact and enforce a draft
    ///
    /// # Errors
    /// Returns a `Storage` error if persistence fails
    pub async fn enact(
        &self,
        draft: &DraftPunishment,
        options: &EnforcementOptions,
    ) -> PunishmentResult<Option<Punishment>> {
        self.enactor.enact_punishment(draft, options).await
    }

    #[must_use]
    pub fn stream(&self, order: &SelectionOrder) -> PunishmentStream {
        order.stream(self.store())
    }

    /// # Errors
    /// Returns a `Storage` error if a page fails to load
    pub async fn all(&self, order: &SelectionOrder) -> PunishmentResult<Vec<Punishment>> {
        order.all(self.store()).await
    }

    /// # Errors
    /// Returns a `Storage` error if the query fails
    pub async fn first(&self, order: &SelectionOrder) -> PunishmentResult<Option<Punishment>> {
        order.first(self.store.as_ref()).await
    }

    /// # Errors
    /// Returns a `Storage` error if the query fails
    pub async fn count(&self, order: &SelectionOrder) -> PunishmentResult<u64> {
        order.count(self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MockPunishmentStore, Vendor};
    use crate::enforcement::MockEnforcer;
    use crate::model::{Operator, PunishmentType, Victim};
    use crate::punish::NoopEvents;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_center_wiring() {
        let mut store = MockPunishmentStore::new();
        store.expect_count().times(1).returning(|_| Ok(4));
        store
            .expect_capabilities()
            .return_const(Vendor::Sqlite.capabilities("warden_"));
        let center = PunishmentCenter::new(
            Arc::new(store),
            Arc::new(MockEnforcer::new()),
            Arc::new(NoopEvents),
            &EnforcementConfig::default(),
        );

        let order = center
            .selection_builder()
            .punishment_type(PunishmentType::Warn)
            .limit_to_retrieve(3)
            .build();
        assert_eq!(center.count(&order).await.unwrap(), 3);
        assert!(format!("{center:?}").contains("PunishmentCenter"));

        let draft = center
            .draft_builder()
            .punishment_type(PunishmentType::Warn)
            .victim(Victim::Player(Uuid::new_v4()))
            .operator(Operator::Console)
            .reason("spam")
            .build();
        assert!(draft.is_ok());
    }
}
