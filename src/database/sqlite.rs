//! Transaction-based store for SQLite
//!
//! SQLite has no stored procedures, so singular enactment runs inside an
//! explicit transaction. Its first statement is a write, which takes the
//! database write lock before the overlap check runs; the uniqueness
//! constraint on the active-singular table backs the check up.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite};
use tracing::{debug, info};

use super::query::{self, SqlValue, overlap_values};
use super::row::RawPunishment;
use super::schema::{Tables, create_statements};
use super::{
    PunishmentStore, StoreCapabilities, UndoRequest, committed, end_seconds, is_unique_violation,
    punishment_values,
};
use crate::STORAGE_TARGET;
use crate::config::SqlConfig;
use crate::error::PunishmentResult;
use crate::model::{DraftPunishment, Punishment, PunishmentType, Victim};
use crate::select::{PageRequest, SelectionOrder};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_values(mut query: SqliteQuery<'_>, values: Vec<SqlValue>) -> SqliteQuery<'_> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Bytes(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<Vec<u8>>),
        };
    }
    query
}

fn decode(row: &SqliteRow) -> PunishmentResult<Punishment> {
    RawPunishment {
        id: row.try_get("id")?,
        punishment_type: row.try_get("punishment_type")?,
        victim_type: row.try_get("victim_type")?,
        victim_uuid: row.try_get("victim_uuid")?,
        victim_address: row.try_get("victim_address")?,
        operator: row.try_get("operator")?,
        reason: row.try_get("reason")?,
        scope_type: row.try_get("scope_type")?,
        scope: row.try_get("scope")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        track_namespace: row.try_get("track_namespace")?,
        track_value: row.try_get("track_value")?,
        undo_operator: row.try_get("undo_operator")?,
        undo_reason: row.try_get("undo_reason")?,
        undo_time: row.try_get("undo_time")?,
    }
    .into_punishment()
}

/// Store enacting singular punishments through explicit transactions
pub struct TransactionalStore {
    pool: SqlitePool,
    capabilities: StoreCapabilities,
    tables: Tables,
}

impl TransactionalStore {
    #[must_use]
    pub fn new(pool: SqlitePool, capabilities: StoreCapabilities) -> Self {
        let tables = Tables::new(&capabilities);
        Self {
            pool,
            capabilities,
            tables,
        }
    }

    /// Connect to the database file named by `config.url`
    ///
    /// # Errors
    /// Returns a `Storage` error if the URL is malformed or the pool cannot connect
    pub async fn connect(config: &SqlConfig, capabilities: StoreCapabilities) -> PunishmentResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.connect_timeout());
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await?;
        info!(target: STORAGE_TARGET, url = %config.url, "Connected to SQLite");
        Ok(Self::new(pool, capabilities))
    }

    /// A private in-memory database, already initialized.
    ///
    /// The pool holds exactly one connection that never expires, since the
    /// database lives only as long as that connection.
    ///
    /// # Errors
    /// Returns a `Storage` error if the database cannot be created
    pub async fn in_memory(table_prefix: &str) -> PunishmentResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self::new(pool, super::Vendor::Sqlite.capabilities(table_prefix));
        store.initialize().await?;
        Ok(store)
    }

    async fn enact_singular(
        &self,
        draft: &DraftPunishment,
        start: i64,
        end: i64,
    ) -> PunishmentResult<Option<i64>> {
        let type_code = SqlValue::from(draft.punishment_type().code());
        let [uuid, address] = overlap_values(draft.victim());
        let mut tx = self.pool.begin().await?;

        let pruned = bind_values(
            sqlx::query(&query::delete_expired_overlapping(&self.tables)),
            vec![type_code.clone(), uuid.clone(), address.clone(), start.into()],
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if pruned > 0 {
            debug!(target: STORAGE_TARGET, pruned, "Pruned expired singular index rows");
        }

        let mut values = punishment_values(draft, start, end);
        values.extend([type_code.clone(), uuid, address, start.into()]);
        let inserted = bind_values(
            sqlx::query(&query::insert_punishment_if_unopposed(&self.tables)),
            values,
        )
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        let id = inserted.last_insert_rowid();

        let victim = draft.victim();
        let indexed = bind_values(
            sqlx::query(&query::insert_singular_index(&self.tables)),
            vec![
                id.into(),
                type_code,
                victim.victim_type().code().into(),
                victim.uuid_bytes().into(),
                victim.address_bytes().into(),
                end.into(),
            ],
        )
        .execute(&mut *tx)
        .await;
        match indexed {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(Some(id))
    }
}

#[async_trait]
impl PunishmentStore for TransactionalStore {
    fn capabilities(&self) -> &StoreCapabilities {
        &self.capabilities
    }

    async fn initialize(&self) -> PunishmentResult<()> {
        for statement in create_statements(&self.capabilities, &self.tables) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        debug!(target: STORAGE_TARGET, prefix = %self.capabilities.table_prefix, "Schema initialized");
        Ok(())
    }

    async fn enact(&self, draft: &DraftPunishment) -> PunishmentResult<Option<Punishment>> {
        let start = Utc::now().timestamp();
        let end = end_seconds(draft, start)?;

        let id = if draft.punishment_type().is_singular() {
            match self.enact_singular(draft, start, end).await? {
                Some(id) => id,
                None => return Ok(None),
            }
        } else {
            bind_values(
                sqlx::query(&query::insert_punishment(&self.tables)),
                punishment_values(draft, start, end),
            )
            .execute(&self.pool)
            .await?
            .last_insert_rowid()
        };
        committed(draft, id, start, end).map(Some)
    }

    async fn find_by_id(&self, id: i64) -> PunishmentResult<Option<Punishment>> {
        sqlx::query(&query::select_by_id(&self.tables))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(decode)
            .transpose()
    }

    async fn find_active_overlapping(
        &self,
        punishment_type: PunishmentType,
        victims: &[Victim],
    ) -> PunishmentResult<Vec<Punishment>> {
        let statement = query::select_active_overlapping(
            &self.tables,
            punishment_type,
            victims,
            Utc::now().timestamp(),
        );
        bind_values(sqlx::query(&statement.sql), statement.values)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(decode)
            .collect()
    }

    async fn undo_by_id(
        &self,
        id: i64,
        punishment_type: PunishmentType,
        undo: &UndoRequest,
    ) -> PunishmentResult<Option<Punishment>> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let revoked = bind_values(
            sqlx::query(&query::insert_revocation(&self.tables)),
            vec![
                undo.operator.to_bytes().into(),
                undo.reason.as_str().into(),
                now.into(),
                id.into(),
                punishment_type.code().into(),
                now.into(),
            ],
        )
        .execute(&mut *tx)
        .await;
        let revoked = match revoked {
            Ok(result) => result.rows_affected(),
            Err(e) if is_unique_violation(&e) => 0,
            Err(e) => return Err(e.into()),
        };
        if revoked == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(&query::delete_singular_index(&self.tables))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query(&query::select_by_id(&self.tables))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        row.as_ref().map(decode).transpose()
    }

    async fn select_page(
        &self,
        order: &SelectionOrder,
        request: PageRequest,
    ) -> PunishmentResult<Vec<Punishment>> {
        let statement = query::select_page(&self.tables, order, request, Utc::now().timestamp());
        bind_values(sqlx::query(&statement.sql), statement.values)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(decode)
            .collect()
    }

    async fn count(&self, order: &SelectionOrder) -> PunishmentResult<u64> {
        let statement = query::count(&self.tables, order, Utc::now().timestamp());
        let count: i64 = bind_values(sqlx::query(&statement.sql), statement.values)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn prune_expired(&self) -> PunishmentResult<u64> {
        let pruned = sqlx::query(&query::delete_expired(&self.tables))
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(pruned)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NetworkAddress, Operator, draft};
    use chrono::Duration;
    use uuid::Uuid;

    async fn store() -> TransactionalStore {
        TransactionalStore::in_memory("test_").await.unwrap()
    }

    fn undo() -> UndoRequest {
        UndoRequest {
            operator: Operator::Console,
            reason: "appeal accepted".into(),
        }
    }

    fn ban(victim: Victim) -> DraftPunishment {
        draft(PunishmentType::Ban, victim, Operator::Console, "cheating")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = store().await;
        store.initialize().await.unwrap();
        assert!(!store.capabilities().use_enactment_procedures);
    }

    #[tokio::test]
    async fn test_enact_and_find() {
        let store = store().await;
        let victim = Victim::Player(Uuid::new_v4());
        let enacted = store.enact(&ban(victim)).await.unwrap().unwrap();

        assert!(enacted.id > 0);
        assert!(enacted.is_permanent());
        assert_eq!(store.find_by_id(enacted.id).await.unwrap(), Some(enacted));
        assert_eq!(store.find_by_id(9_999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_singular_conflict_covers_overlapping_victims() {
        let store = store().await;
        let uuid = Uuid::new_v4();
        let address: NetworkAddress = "203.0.113.7".parse().unwrap();

        assert!(store.enact(&ban(Victim::composite(uuid, address))).await.unwrap().is_some());
        assert!(store.enact(&ban(Victim::Player(uuid))).await.unwrap().is_none());
        assert!(store.enact(&ban(Victim::Address(address))).await.unwrap().is_none());
        assert!(store.enact(&ban(Victim::Player(Uuid::new_v4()))).await.unwrap().is_some());

        // Mutes are tracked independently of bans
        let mute = draft(PunishmentType::Mute, Victim::Player(uuid), Operator::Console, "spam")
            .build()
            .unwrap();
        assert!(store.enact(&mute).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_warns_never_conflict() {
        let store = store().await;
        let victim = Victim::Player(Uuid::new_v4());
        let warn = draft(PunishmentType::Warn, victim, Operator::Console, "language")
            .build()
            .unwrap();
        let first = store.enact(&warn).await.unwrap().unwrap();
        let second = store.enact(&warn).await.unwrap().unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_expired_ban_does_not_conflict() {
        let store = store().await;
        let victim = Victim::Player(Uuid::new_v4());
        let expired = draft(PunishmentType::Ban, victim, Operator::Console, "short")
            .duration(Duration::seconds(1))
            .build()
            .unwrap();
        store.enact(&expired).await.unwrap().unwrap();

        // Backdate the index entry so it has lapsed
        sqlx::query("UPDATE test_singular_active SET end_time = 1")
            .execute(&store.pool)
            .await
            .unwrap();
        sqlx::query("UPDATE test_punishments SET end_time = 1")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store.enact(&ban(victim)).await.unwrap().is_some());
        assert_eq!(store.prune_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undo_by_id() {
        let store = store().await;
        let victim = Victim::Player(Uuid::new_v4());
        let enacted = store.enact(&ban(victim)).await.unwrap().unwrap();

        assert!(store.undo_by_id(enacted.id, PunishmentType::Mute, &undo()).await.unwrap().is_none());

        let revoked = store
            .undo_by_id(enacted.id, PunishmentType::Ban, &undo())
            .await
            .unwrap()
            .unwrap();
        let revocation = revoked.revocation.unwrap();
        assert_eq!(revocation.operator, Operator::Console);
        assert_eq!(revocation.reason, "appeal accepted");

        assert!(store.undo_by_id(enacted.id, PunishmentType::Ban, &undo()).await.unwrap().is_none());

        // The victim can be banned again once the first ban is revoked
        assert!(store.enact(&ban(victim)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_kicks_cannot_be_revoked() {
        let store = store().await;
        let kick = draft(PunishmentType::Kick, Victim::Player(Uuid::new_v4()), Operator::Console, "afk")
            .build()
            .unwrap();
        let kicked = store.enact(&kick).await.unwrap().unwrap();
        assert_eq!(kicked.end, Some(kicked.start));
        assert!(!kicked.is_active());
        assert!(store.undo_by_id(kicked.id, PunishmentType::Kick, &undo()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_active_overlapping() {
        let store = store().await;
        let uuid = Uuid::new_v4();
        let address: NetworkAddress = "198.51.100.4".parse().unwrap();
        let enacted = store
            .enact(&ban(Victim::composite(uuid, address)))
            .await
            .unwrap()
            .unwrap();

        let found = store
            .find_active_overlapping(PunishmentType::Ban, &[Victim::Player(uuid)])
            .await
            .unwrap();
        assert_eq!(found, vec![enacted]);

        let none = store
            .find_active_overlapping(PunishmentType::Mute, &[Victim::Player(uuid)])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_select_and_count() {
        let store = store().await;
        let victim = Victim::Player(Uuid::new_v4());
        for reason in ["one", "two", "three"] {
            let warn = draft(PunishmentType::Warn, victim, Operator::Console, reason)
                .build()
                .unwrap();
            store.enact(&warn).await.unwrap();
        }
        let order = SelectionOrder::builder()
            .punishment_type(PunishmentType::Warn)
            .build();

        assert_eq!(store.count(&order).await.unwrap(), 3);
        let page = store
            .select_page(&order, PageRequest { after: None, offset: 1, limit: 5 })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        // Same start second: ties are broken by ascending id
        assert!(page[0].id < page[1].id || page[0].start > page[1].start);
    }
}
