//! Relational punishment storage
//!
//! [`PunishmentStore`] is the only path that writes punishments. Two
//! strategies implement it: [`ProcedureStore`] enacts singular punishments
//! through a server-side procedure, [`TransactionalStore`] through an explicit
//! transaction backed by a uniqueness constraint. Which one runs is decided by
//! the `use_enactment_procedures` capability flag when the store is opened.

mod mysql;
mod query;
mod row;
mod schema;
mod sqlite;
mod vendor;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::STORAGE_TARGET;
use crate::config::SqlConfig;
use crate::error::{PunishmentError, PunishmentResult};
use crate::model::{
    DraftPunishment, Operator, Punishment, PunishmentType, Victim, from_epoch_seconds,
};
use crate::select::{PageRequest, SelectionOrder};

pub use mysql::ProcedureStore;
pub use schema::Tables;
pub use sqlite::TransactionalStore;
pub use vendor::{SqlDialect, StoreCapabilities, Vendor};

use query::SqlValue;

/// Attribution stamped onto a punishment when it is revoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoRequest {
    pub operator: Operator,
    pub reason: String,
}

/// Persistence of punishments.
///
/// Conflicts and missing revocation targets are `Ok(None)`; errors are
/// genuine storage failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PunishmentStore: Send + Sync {
    /// Capability flags this store was opened with
    fn capabilities(&self) -> &StoreCapabilities;

    /// Create tables, indexes, the history view and any procedures.
    /// Safe to run against an existing schema.
    async fn initialize(&self) -> PunishmentResult<()>;

    /// Persist a draft, assigning its id and start time.
    ///
    /// For singular types the overlap check and the insert are atomic;
    /// `None` means an overlapping active punishment already exists.
    async fn enact(&self, draft: &DraftPunishment) -> PunishmentResult<Option<Punishment>>;

    async fn find_by_id(&self, id: i64) -> PunishmentResult<Option<Punishment>>;

    /// Active punishments of a type overlapping any candidate, oldest first
    async fn find_active_overlapping(
        &self,
        punishment_type: PunishmentType,
        victims: &[Victim],
    ) -> PunishmentResult<Vec<Punishment>>;

    /// Revoke an active punishment of the given type.
    ///
    /// `None` if it does not exist, is not active, or another revocation
    /// won the race.
    async fn undo_by_id(
        &self,
        id: i64,
        punishment_type: PunishmentType,
        undo: &UndoRequest,
    ) -> PunishmentResult<Option<Punishment>>;

    async fn select_page(
        &self,
        order: &SelectionOrder,
        request: PageRequest,
    ) -> PunishmentResult<Vec<Punishment>>;

    /// Rows matching the order's filters, ignoring skip and limit
    async fn count(&self, order: &SelectionOrder) -> PunishmentResult<u64>;

    /// Drop expired entries from the active-singular index
    async fn prune_expired(&self) -> PunishmentResult<u64>;

    async fn close(&self);
}

/// Open the store described by `config` and initialize its schema
///
/// # Errors
/// Returns a `Config` error if the URL does not match the vendor, or a
/// `Storage` error if the connection or schema setup fails
pub async fn connect(config: &SqlConfig) -> PunishmentResult<Arc<dyn PunishmentStore>> {
    if !config.vendor.accepts_url(&config.url) {
        return Err(PunishmentError::Config(format!(
            "url {} does not belong to vendor {}",
            config.url, config.vendor
        )));
    }
    let capabilities = config.vendor.capabilities(config.table_prefix.clone());
    info!(
        target: STORAGE_TARGET,
        vendor = %config.vendor,
        procedures = capabilities.use_enactment_procedures,
        unsigned = capabilities.unsigned_numerics,
        "Opening punishment store"
    );

    let store: Arc<dyn PunishmentStore> = if capabilities.use_enactment_procedures {
        Arc::new(ProcedureStore::connect(config, capabilities).await?)
    } else {
        Arc::new(TransactionalStore::connect(config, capabilities).await?)
    };
    store.initialize().await?;
    Ok(store)
}

/// The twelve column values of a punishment row, in `PUNISHMENT_COLUMNS` order
fn punishment_values(draft: &DraftPunishment, start: i64, end: i64) -> Vec<SqlValue> {
    let victim = draft.victim();
    let track = draft.escalation_track();
    vec![
        draft.punishment_type().code().into(),
        victim.victim_type().code().into(),
        victim.uuid_bytes().into(),
        victim.address_bytes().into(),
        draft.operator().to_bytes().into(),
        draft.reason().into(),
        draft.scope().type_code().into(),
        draft.scope().value().into(),
        start.into(),
        end.into(),
        track.map(|t| t.namespace.clone()).into(),
        track.map(|t| t.value.clone()).into(),
    ]
}

/// The punishment a committed draft became
fn committed(draft: &DraftPunishment, id: i64, start: i64, end: i64) -> PunishmentResult<Punishment> {
    Ok(Punishment {
        id,
        punishment_type: draft.punishment_type(),
        victim: *draft.victim(),
        operator: *draft.operator(),
        reason: draft.reason().to_owned(),
        scope: draft.scope().clone(),
        start: from_epoch_seconds(start)?,
        end: match end {
            0 => None,
            end => Some(from_epoch_seconds(end)?),
        },
        track: draft.escalation_track().cloned(),
        revocation: None,
    })
}

/// End of a draft committed at `start`, as stored
fn end_seconds(draft: &DraftPunishment, start: i64) -> PunishmentResult<i64> {
    let start = from_epoch_seconds(start)?;
    Ok(crate::model::end_to_epoch_seconds(draft.end_from(start)?))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(e) if e.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EscalationTrack, ServerScope, draft};
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn test_punishment_values_layout() {
        let uuid = Uuid::new_v4();
        let draft = draft(PunishmentType::Mute, Victim::Player(uuid), Operator::Console, "spam")
            .scope(ServerScope::server("lobby").unwrap())
            .escalation_track(Some(EscalationTrack::new("chat", "spam").unwrap()))
            .build()
            .unwrap();
        let values = punishment_values(&draft, 100, 160);

        assert_eq!(values.len(), 12);
        assert_eq!(values[0], SqlValue::Int(1));
        assert_eq!(values[2], SqlValue::Bytes(uuid.as_bytes().to_vec()));
        assert_eq!(values[3], SqlValue::Bytes(Vec::new()));
        assert_eq!(values[7], SqlValue::Text("lobby".into()));
        assert_eq!(values[10], SqlValue::Text("chat".into()));
        assert_eq!(values[11], SqlValue::Text("spam".into()));
    }

    #[tokio::test]
    async fn test_connect_rejects_foreign_url() {
        let config = SqlConfig {
            vendor: Vendor::MariaDb,
            url: "sqlite::memory:".into(),
            ..SqlConfig::default()
        };
        assert!(matches!(connect(&config).await, Err(PunishmentError::Config(_))));
    }

    #[test]
    fn test_committed_and_end() {
        let victim = Victim::Player(Uuid::new_v4());
        let permanent = draft(PunishmentType::Ban, victim, Operator::Console, "cheating")
            .build()
            .unwrap();
        assert_eq!(end_seconds(&permanent, 1_000).unwrap(), 0);
        let punishment = committed(&permanent, 3, 1_000, 0).unwrap();
        assert_eq!(punishment.id, 3);
        assert!(punishment.end.is_none());

        let timed = draft(PunishmentType::Mute, victim, Operator::Console, "spam")
            .duration(Duration::minutes(1))
            .build()
            .unwrap();
        assert_eq!(end_seconds(&timed, 1_000).unwrap(), 1_060);

        let kick = draft(PunishmentType::Kick, victim, Operator::Console, "afk")
            .build()
            .unwrap();
        assert_eq!(end_seconds(&kick, 1_000).unwrap(), 1_000);
    }
}
