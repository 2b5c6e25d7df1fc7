//! SQL text and parameters shared by every store
//!
//! Both vendors take positional `?` placeholders, so statements are rendered
//! once here and bound per driver from a list of [`SqlValue`]s.

use std::hash::Hash;

use super::schema::Tables;
use crate::model::{PunishmentType, Victim};
use crate::select::{PageRequest, SelectionOrder, SelectionPredicate};

/// A bindable parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Null,
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Columns of the history view, in the order rows are decoded
pub const HISTORY_COLUMNS: &str = "id, punishment_type, victim_type, victim_uuid, victim_address, \
     operator, reason, scope_type, scope, start_time, end_time, track_namespace, track_value, \
     undo_operator, undo_reason, undo_time";

/// Columns written when inserting a punishment
pub const PUNISHMENT_COLUMNS: &str = "punishment_type, victim_type, victim_uuid, victim_address, \
     operator, reason, scope_type, scope, start_time, end_time, track_namespace, track_value";

/// Unexpired at the bound instant
pub const ACTIVE_END_CONDITION: &str = "(end_time = 0 OR end_time > ?)";

/// Rows of the `punishments` table that overlap a victim.
///
/// `uuid` and `address` are the SQL expressions compared against; binding
/// NULL for either disables that half of the match.
#[must_use]
pub fn overlap_condition(uuid: &str, address: &str) -> String {
    format!(
        "((victim_type IN (0, 2) AND victim_uuid = {uuid}) \
         OR (victim_type IN (1, 2) AND victim_address = {address}))"
    )
}

/// Parameters for one `overlap_condition("?", "?")`
#[must_use]
pub fn overlap_values(victim: &Victim) -> [SqlValue; 2] {
    [
        victim.uuid().map(|uuid| uuid.as_bytes().to_vec()).into(),
        victim.address().map(|address| address.to_bytes()).into(),
    ]
}

/// Active punishments: unrevoked, not instantaneous and unexpired at `?`
#[must_use]
pub fn active_condition() -> String {
    format!(
        "undo_time IS NULL AND punishment_type <> {kick} AND {ACTIVE_END_CONDITION}",
        kick = PunishmentType::Kick.code()
    )
}

/// A WHERE clause under construction
#[derive(Debug, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Conditions {
    pub fn push(&mut self, clause: impl Into<String>, values: impl IntoIterator<Item = SqlValue>) {
        self.clauses.push(clause.into());
        self.values.extend(values);
    }

    /// Add a predicate, rendering each value as `value_clause`
    fn push_predicate<U, F>(&mut self, predicate: &SelectionPredicate<U>, value_clause: &str, bind: F)
    where
        U: Eq + Hash + Clone,
        F: Fn(&U) -> Vec<SqlValue>,
    {
        if predicate.is_match_all() {
            return;
        }
        let (values, negate) = if predicate.is_acceptance() {
            (predicate.accepted_values(), false)
        } else {
            (predicate.rejected_values(), true)
        };
        if values.is_empty() {
            self.push("1 = 0", []);
            return;
        }

        let mut bound = Vec::new();
        let alternatives = values
            .iter()
            .map(|value| {
                bound.extend(bind(value));
                value_clause
            })
            .collect::<Vec<_>>()
            .join(" OR ");
        let clause = if negate {
            format!("NOT ({alternatives})")
        } else {
            format!("({alternatives})")
        };
        self.push(clause, bound);
    }

    /// Render as ` WHERE ...`, or nothing when there are no clauses
    #[must_use]
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// Filters of a selection order evaluated at `now` (epoch seconds)
#[must_use]
pub fn selection_conditions(order: &SelectionOrder, now: i64) -> Conditions {
    let mut conditions = Conditions::default();
    conditions.push_predicate(order.types(), "punishment_type = ?", |punishment_type| {
        vec![punishment_type.code().into()]
    });
    conditions.push_predicate(
        order.victims(),
        "(victim_type = ? AND victim_uuid = ? AND victim_address = ?)",
        |victim| {
            vec![
                victim.victim_type().code().into(),
                victim.uuid_bytes().into(),
                victim.address_bytes().into(),
            ]
        },
    );
    conditions.push_predicate(order.operators(), "operator = ?", |operator| {
        vec![operator.to_bytes().into()]
    });
    conditions.push_predicate(order.scopes(), "(scope_type = ? AND scope = ?)", |scope| {
        vec![scope.type_code().into(), scope.value().into()]
    });

    let tracks = order.escalation_tracks();
    if !tracks.is_match_all() && !tracks.is_acceptance() {
        // Untracked rows are never rejected by a track rejection
        let mut rejection = Conditions::default();
        rejection.push_predicate(tracks, "(track_namespace = ? AND track_value = ?)", |track| {
            vec![track.namespace.as_str().into(), track.value.as_str().into()]
        });
        let clause = format!("(track_namespace IS NULL OR {})", rejection.clauses.join(" AND "));
        conditions.push(clause, rejection.values);
    } else {
        conditions.push_predicate(tracks, "(track_namespace = ? AND track_value = ?)", |track| {
            vec![track.namespace.as_str().into(), track.value.as_str().into()]
        });
    }

    if order.selects_active_only() {
        conditions.push(active_condition(), [now.into()]);
    }
    conditions
}

/// Statement text plus the parameters to bind, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// One page of a selection: newest first, ties broken by ascending id
#[must_use]
pub fn select_page(tables: &Tables, order: &SelectionOrder, request: PageRequest, now: i64) -> Statement {
    let mut conditions = selection_conditions(order, now);
    if let Some(cursor) = request.after {
        conditions.push(
            "(start_time < ? OR (start_time = ? AND id > ?))",
            [cursor.start.into(), cursor.start.into(), cursor.id.into()],
        );
    }
    let sql = format!(
        "SELECT {HISTORY_COLUMNS} FROM {history}{where_clause} \
         ORDER BY start_time DESC, id ASC LIMIT ? OFFSET ?",
        history = tables.history,
        where_clause = conditions.where_clause(),
    );
    let mut values = conditions.into_values();
    values.push(i64::from(request.limit).into());
    values.push(i64::from(request.offset).into());
    Statement { sql, values }
}

/// Count of every row a selection matches, ignoring skip and limit
#[must_use]
pub fn count(tables: &Tables, order: &SelectionOrder, now: i64) -> Statement {
    let conditions = selection_conditions(order, now);
    Statement {
        sql: format!(
            "SELECT COUNT(*) FROM {history}{where_clause}",
            history = tables.history,
            where_clause = conditions.where_clause(),
        ),
        values: conditions.into_values(),
    }
}

/// Active punishments of one type overlapping any of `victims`, oldest first
#[must_use]
pub fn select_active_overlapping(
    tables: &Tables,
    punishment_type: PunishmentType,
    victims: &[Victim],
    now: i64,
) -> Statement {
    let mut conditions = Conditions::default();
    conditions.push("punishment_type = ?", [punishment_type.code().into()]);
    let overlaps = victims
        .iter()
        .map(|_| overlap_condition("?", "?"))
        .collect::<Vec<_>>()
        .join(" OR ");
    conditions.push(
        if overlaps.is_empty() { "1 = 0".to_owned() } else { format!("({overlaps})") },
        victims.iter().flat_map(overlap_values),
    );
    conditions.push(active_condition(), [now.into()]);
    Statement {
        sql: format!(
            "SELECT {HISTORY_COLUMNS} FROM {history}{where_clause} ORDER BY id ASC",
            history = tables.history,
            where_clause = conditions.where_clause(),
        ),
        values: conditions.into_values(),
    }
}

#[must_use]
pub fn select_by_id(tables: &Tables) -> String {
    format!("SELECT {HISTORY_COLUMNS} FROM {} WHERE id = ?", tables.history)
}

#[must_use]
pub fn insert_punishment(tables: &Tables) -> String {
    format!(
        "INSERT INTO {} ({PUNISHMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        tables.punishments
    )
}

/// Insert a punishment unless an overlapping active one of the same type is
/// indexed; binds the twelve column values, then type, overlap and `now`
#[must_use]
pub fn insert_punishment_if_unopposed(tables: &Tables) -> String {
    format!(
        "INSERT INTO {punishments} ({PUNISHMENT_COLUMNS}) \
         SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? \
         WHERE NOT EXISTS (SELECT 1 FROM {singular} \
         WHERE punishment_type = ? AND {overlap} AND {ACTIVE_END_CONDITION})",
        punishments = tables.punishments,
        singular = tables.singular_active,
        overlap = overlap_condition("?", "?"),
    )
}

/// Drop expired index rows overlapping a victim; binds type, overlap and `now`
#[must_use]
pub fn delete_expired_overlapping(tables: &Tables) -> String {
    format!(
        "DELETE FROM {} WHERE punishment_type = ? AND {} AND end_time <> 0 AND end_time <= ?",
        tables.singular_active,
        overlap_condition("?", "?"),
    )
}

/// Drop every expired index row; binds `now`
#[must_use]
pub fn delete_expired(tables: &Tables) -> String {
    format!(
        "DELETE FROM {} WHERE end_time <> 0 AND end_time <= ?",
        tables.singular_active
    )
}

#[must_use]
pub fn insert_singular_index(tables: &Tables) -> String {
    format!(
        "INSERT INTO {} (id, punishment_type, victim_type, victim_uuid, victim_address, end_time) \
         VALUES (?, ?, ?, ?, ?, ?)",
        tables.singular_active
    )
}

#[must_use]
pub fn delete_singular_index(tables: &Tables) -> String {
    format!("DELETE FROM {} WHERE id = ?", tables.singular_active)
}

/// Record a revocation if the punishment exists, has the given type, is
/// active and is not yet revoked; binds operator, reason, time, id, type, `now`
#[must_use]
pub fn insert_revocation(tables: &Tables) -> String {
    format!(
        "INSERT INTO {revocations} (id, undo_operator, undo_reason, undo_time) \
         SELECT p.id, ?, ?, ? FROM {punishments} p \
         WHERE p.id = ? AND p.punishment_type = ? AND p.punishment_type <> {kick} \
         AND (p.end_time = 0 OR p.end_time > ?) \
         AND NOT EXISTS (SELECT 1 FROM {revocations} r WHERE r.id = p.id)",
        revocations = tables.revocations,
        punishments = tables.punishments,
        kick = PunishmentType::Kick.code(),
    )
}

/// Invoke the enactment procedure with its thirteen arguments
#[must_use]
pub fn call_enact_procedure(tables: &Tables) -> String {
    format!(
        "CALL {}(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        tables.enact_procedure
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Vendor;
    use crate::model::{EscalationTrack, NetworkAddress, Operator};
    use crate::select::PageCursor;
    use uuid::Uuid;

    fn tables() -> Tables {
        Tables::new(&Vendor::Sqlite.capabilities(""))
    }

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_default_selection_is_active_only() {
        let order = SelectionOrder::builder().build();
        let statement = select_page(&tables(), &order, PageRequest { after: None, offset: 0, limit: 100 }, 50);

        assert!(statement.sql.contains("WHERE undo_time IS NULL AND punishment_type <> 3"));
        assert!(statement.sql.ends_with("ORDER BY start_time DESC, id ASC LIMIT ? OFFSET ?"));
        assert_eq!(statement.values, vec![SqlValue::Int(50), SqlValue::Int(100), SqlValue::Int(0)]);
        assert_eq!(placeholders(&statement.sql), statement.values.len());
    }

    #[test]
    fn test_select_all_has_no_where_clause() {
        let order = SelectionOrder::builder().select_all().build();
        let statement = count(&tables(), &order, 0);
        assert_eq!(statement.sql, "SELECT COUNT(*) FROM simple_history");
        assert!(statement.values.is_empty());
    }

    #[test]
    fn test_filters_bind_in_order() {
        let uuid = Uuid::new_v4();
        let order = SelectionOrder::builder()
            .punishment_type(PunishmentType::Mute)
            .victim(Victim::Player(uuid))
            .operator(Operator::Console)
            .select_all()
            .build();
        let statement = count(&tables(), &order, 0);

        assert_eq!(placeholders(&statement.sql), statement.values.len());
        assert_eq!(statement.values[0], SqlValue::Int(1));
        assert_eq!(statement.values[1], SqlValue::Int(0));
        assert_eq!(statement.values[2], SqlValue::Bytes(uuid.as_bytes().to_vec()));
        assert_eq!(statement.values[3], SqlValue::Bytes(Vec::new()));
        assert_eq!(statement.values[4], SqlValue::Bytes(vec![0; 16]));
    }

    #[test]
    fn test_empty_acceptance_matches_nothing() {
        let order = SelectionOrder::builder()
            .types(SelectionPredicate::matching_any_of([]))
            .build();
        let statement = count(&tables(), &order, 0);
        assert!(statement.sql.contains("WHERE 1 = 0 AND"));
    }

    #[test]
    fn test_track_filters() {
        let track = EscalationTrack::new("spam", "chat").unwrap();
        let statement = count(&tables(), &SelectionOrder::builder().select_all().build(), 0);
        assert!(!statement.sql.contains("track_namespace"));

        let mut builder = SelectionOrder::builder();
        builder.select_all().escalation_track(track.clone());
        let statement = count(&tables(), &builder.build(), 0);
        assert!(statement.sql.contains("((track_namespace = ? AND track_value = ?))"));
        assert_eq!(statement.values.len(), 2);

        // Rejecting a track keeps untracked rows
        builder.escalation_tracks(SelectionPredicate::matching_none_of([track]));
        let statement = count(&tables(), &builder.build(), 0);
        assert!(statement.sql.contains(
            "(track_namespace IS NULL OR NOT ((track_namespace = ? AND track_value = ?)))"
        ));
        assert_eq!(
            statement.values,
            vec![SqlValue::Text("spam".into()), SqlValue::Text("chat".into())]
        );
    }

    #[test]
    fn test_cursor_condition() {
        let order = SelectionOrder::builder().select_all().build();
        let request = PageRequest {
            after: Some(PageCursor { start: 10, id: 4 }),
            offset: 0,
            limit: 5,
        };
        let statement = select_page(&tables(), &order, request, 0);
        assert!(statement.sql.contains("WHERE (start_time < ? OR (start_time = ? AND id > ?))"));
        assert_eq!(
            statement.values,
            vec![SqlValue::Int(10), SqlValue::Int(10), SqlValue::Int(4), SqlValue::Int(5), SqlValue::Int(0)]
        );
    }

    #[test]
    fn test_overlap_values_skip_wildcards() {
        let uuid = Uuid::new_v4();
        let composite = Victim::composite(uuid, NetworkAddress::WILDCARD);
        assert_eq!(
            overlap_values(&composite),
            [SqlValue::Bytes(uuid.as_bytes().to_vec()), SqlValue::Null]
        );

        let address: NetworkAddress = "10.0.0.1".parse().unwrap();
        assert_eq!(
            overlap_values(&Victim::Address(address)),
            [SqlValue::Null, SqlValue::Bytes(vec![10, 0, 0, 1])]
        );

        let bare = [
            Victim::Address(NetworkAddress::WILDCARD),
            Victim::Player(Victim::WILDCARD_UUID),
        ];
        for victim in &bare {
            assert_eq!(overlap_values(victim), [SqlValue::Null, SqlValue::Null]);
        }
    }

    #[test]
    fn test_overlapping_statement_placeholders() {
        let victims = [
            Victim::Player(Uuid::new_v4()),
            Victim::Address("10.0.0.1".parse().unwrap()),
        ];
        let statement = select_active_overlapping(&tables(), PunishmentType::Ban, &victims, 9);
        assert_eq!(placeholders(&statement.sql), statement.values.len());
        assert_eq!(statement.values.len(), 1 + 4 + 1);

        let none = select_active_overlapping(&tables(), PunishmentType::Ban, &[], 9);
        assert!(none.sql.contains("1 = 0"));
    }

    #[test]
    fn test_statement_placeholder_counts() {
        let tables = tables();
        assert_eq!(placeholders(&insert_punishment(&tables)), 12);
        assert_eq!(placeholders(&insert_punishment_if_unopposed(&tables)), 12 + 1 + 2 + 1);
        assert_eq!(placeholders(&delete_expired_overlapping(&tables)), 4);
        assert_eq!(placeholders(&insert_singular_index(&tables)), 6);
        assert_eq!(placeholders(&insert_revocation(&tables)), 6);
        assert_eq!(placeholders(&call_enact_procedure(&tables)), 13);
    }
}
