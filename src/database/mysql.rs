//! Procedure-based store for MariaDB
//!
//! Singular enactment is a single `CALL` of the enactment procedure, which
//! runs the overlap check and both inserts in one server-side transaction.
//! Integer columns are unsigned when the capability flag says so, and are
//! decoded accordingly.
//!
//! InnoDB may pick a racing enactment as a deadlock victim. The procedure
//! rolls back on any error, so the call is retried; a retry sees the winner's
//! row and reports the conflict.

use std::future::Future;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{MySql, Row};
use tracing::{debug, info, warn};

use super::query::{self, SqlValue, overlap_values};
use super::row::{RawPunishment, unsigned_to_i64};
use super::schema::{Tables, create_enact_procedure, create_statements, drop_enact_procedure};
use super::{
    PunishmentStore, StoreCapabilities, UndoRequest, committed, end_seconds, is_unique_violation,
    punishment_values,
};
use crate::STORAGE_TARGET;
use crate::config::SqlConfig;
use crate::error::PunishmentResult;
use crate::model::{DraftPunishment, Punishment, PunishmentType, Victim};
use crate::select::{PageRequest, SelectionOrder};

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

fn bind_values(mut query: MySqlQuery<'_>, values: Vec<SqlValue>) -> MySqlQuery<'_> {
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

/// Reads integer columns as signed or unsigned depending on the schema
#[derive(Debug, Clone, Copy)]
struct IntColumns {
    unsigned: bool,
}

impl IntColumns {
    fn get(self, row: &MySqlRow, column: &str) -> PunishmentResult<i64> {
        if self.unsigned {
            unsigned_to_i64(row.try_get::<u64, _>(column)?, column)
        } else {
            Ok(row.try_get(column)?)
        }
    }

    fn get_optional(self, row: &MySqlRow, column: &str) -> PunishmentResult<Option<i64>> {
        if self.unsigned {
            row.try_get::<Option<u64>, _>(column)?
                .map(|value| unsigned_to_i64(value, column))
                .transpose()
        } else {
            Ok(row.try_get(column)?)
        }
    }

    fn decode(self, row: &MySqlRow) -> PunishmentResult<Punishment> {
        RawPunishment {
            id: self.get(row, "id")?,
            punishment_type: self.get(row, "punishment_type")?,
            victim_type: self.get(row, "victim_type")?,
            victim_uuid: row.try_get("victim_uuid")?,
            victim_address: row.try_get("victim_address")?,
            operator: row.try_get("operator")?,
            reason: row.try_get("reason")?,
            scope_type: self.get(row, "scope_type")?,
            scope: row.try_get("scope")?,
            start_time: self.get(row, "start_time")?,
            end_time: self.get(row, "end_time")?,
            track_namespace: row.try_get("track_namespace")?,
            track_value: row.try_get("track_value")?,
            undo_operator: row.try_get("undo_operator")?,
            undo_reason: row.try_get("undo_reason")?,
            undo_time: self.get_optional(row, "undo_time")?,
        }
        .into_punishment()
    }
}

/// Store enacting singular punishments through a stored procedure
pub struct ProcedureStore {
    pool: MySqlPool,
    capabilities: StoreCapabilities,
    tables: Tables,
    ints: IntColumns,
}

impl ProcedureStore {
    #[must_use]
    pub fn new(pool: MySqlPool, capabilities: StoreCapabilities) -> Self {
        let tables = Tables::new(&capabilities);
        let ints = IntColumns {
            unsigned: capabilities.unsigned_numerics,
        };
        Self {
            pool,
            capabilities,
            tables,
            ints,
        }
    }

    /// Connect to the server named by `config.url`
    ///
    /// # Errors
    /// Returns a `Storage` error if the URL is malformed or the pool cannot connect
    pub async fn connect(config: &SqlConfig, capabilities: StoreCapabilities) -> PunishmentResult<Self> {
        let options = MySqlConnectOptions::from_str(&config.url)?;
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await?;
        info!(target: STORAGE_TARGET, "Connected to MariaDB");
        Ok(Self::new(pool, capabilities))
    }

    async fn enact_singular(&self, draft: &DraftPunishment) -> PunishmentResult<Option<(i64, i64)>> {
        let sql = query::call_enact_procedure(&self.tables);
        let sql = sql.as_str();
        let pool = &self.pool;
        let result = retry_serialization_failures(move || {
            bind_values(sqlx::query(sql), procedure_values(draft)).fetch_optional(pool)
        })
        .await;

        let row = match result {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) if is_unique_violation(&e) => return Ok(None),
            Err(e) if is_serialization_failure(&e) => {
                warn!(target: STORAGE_TARGET, victim = %draft.victim(), error = %e, "Enactment kept deadlocking, treating as a conflict");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let Some(id) = self.ints.get_optional(&row, "id")? else {
            return Ok(None);
        };
        Ok(Some((id, self.ints.get(&row, "start_time")?)))
    }
}

/// Times a deadlocked enactment is attempted before giving up
const ENACT_ATTEMPTS: u32 = 5;

/// SQLSTATE for deadlocks and other serialization failures
const SERIALIZATION_FAILURE: &str = "40001";

/// Arguments of the enactment procedure, in declaration order
fn procedure_values(draft: &DraftPunishment) -> Vec<SqlValue> {
    let victim = draft.victim();
    let [uuid, address] = overlap_values(victim);
    let track = draft.escalation_track();
    vec![
        draft.punishment_type().code().into(),
        victim.victim_type().code().into(),
        victim.uuid_bytes().into(),
        victim.address_bytes().into(),
        uuid,
        address,
        draft.operator().to_bytes().into(),
        draft.reason().into(),
        draft.scope().type_code().into(),
        draft.scope().value().into(),
        draft.duration_seconds().into(),
        track.map(|t| t.namespace.clone()).into(),
        track.map(|t| t.value.clone()).into(),
    ]
}

fn is_serialization_failure(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(e) if e.code().as_deref() == Some(SERIALIZATION_FAILURE))
}

/// Run `attempt` until it stops failing with a serialization failure, at most
/// [`ENACT_ATTEMPTS`] times
async fn retry_serialization_failures<T, F, Fut>(mut attempt: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(e) if tries < ENACT_ATTEMPTS && is_serialization_failure(&e) => {
                debug!(target: STORAGE_TARGET, attempt = tries, error = %e, "Enactment rolled back, retrying");
                tries += 1;
            }
            result => return result,
        }
    }
}

#[async_trait]
impl PunishmentStore for ProcedureStore {
    fn capabilities(&self) -> &StoreCapabilities {
        &self.capabilities
    }

    async fn initialize(&self) -> PunishmentResult<()> {
        for statement in create_statements(&self.capabilities, &self.tables) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        // Procedure bodies contain semicolons, so they go through the text protocol
        sqlx::raw_sql(&drop_enact_procedure(&self.tables))
            .execute(&self.pool)
            .await?;
        sqlx::raw_sql(&create_enact_procedure(&self.capabilities, &self.tables))
            .execute(&self.pool)
            .await?;
        debug!(target: STORAGE_TARGET, prefix = %self.capabilities.table_prefix, "Schema initialized");
        Ok(())
    }

    async fn enact(&self, draft: &DraftPunishment) -> PunishmentResult<Option<Punishment>> {
        if draft.punishment_type().is_singular() {
            let Some((id, start)) = self.enact_singular(draft).await? else {
                return Ok(None);
            };
            let end = end_seconds(draft, start)?;
            return committed(draft, id, start, end).map(Some);
        }

        let start = Utc::now().timestamp();
        let end = end_seconds(draft, start)?;
        let id = bind_values(
            sqlx::query(&query::insert_punishment(&self.tables)),
            punishment_values(draft, start, end),
        )
        .execute(&self.pool)
        .await?
        .last_insert_id();
        committed(draft, unsigned_to_i64(id, "id")?, start, end).map(Some)
    }

    async fn find_by_id(&self, id: i64) -> PunishmentResult<Option<Punishment>> {
        sqlx::query(&query::select_by_id(&self.tables))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(|row| self.ints.decode(row))
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
            .map(|row| self.ints.decode(row))
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
        row.as_ref().map(|row| self.ints.decode(row)).transpose()
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
            .map(|row| self.ints.decode(row))
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
    use crate::model::{Operator, draft};
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    #[derive(Debug, thiserror::Error)]
    #[error("database error {0}")]
    struct FakeDatabaseError(&'static str);

    impl DatabaseError for FakeDatabaseError {
        fn message(&self) -> &str {
            "fake"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn database_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDatabaseError(code)))
    }

    #[test]
    fn test_deadlock_is_serialization_failure() {
        assert!(is_serialization_failure(&database_error("40001")));
        assert!(!is_serialization_failure(&database_error("23000")));
        assert!(!is_serialization_failure(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn test_deadlocked_call_is_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_serialization_failures(|| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(database_error("40001"))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_serialization_failures(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(database_error("40001")) }
        })
        .await;

        assert!(result.is_err_and(|e| is_serialization_failure(&e)));
        assert_eq!(calls.load(Ordering::SeqCst), ENACT_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_serialization_failures(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(database_error("23000")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_procedure_duration_matches_stored_end() {
        let victim = Victim::Player(Uuid::new_v4());
        let mute = draft(PunishmentType::Mute, victim, Operator::Console, "spam")
            .duration(chrono::Duration::milliseconds(500))
            .build()
            .unwrap();
        let values = procedure_values(&mute);
        assert_eq!(values.len(), 13);
        assert_eq!(values[10], SqlValue::Int(1));
        assert_eq!(end_seconds(&mute, 100).unwrap(), 101);

        let ban = draft(PunishmentType::Ban, victim, Operator::Console, "cheating")
            .build()
            .unwrap();
        assert_eq!(procedure_values(&ban)[10], SqlValue::Int(0));
        assert_eq!(end_seconds(&ban, 100).unwrap(), 0);
    }
}
