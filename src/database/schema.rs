//! Schema definition
//!
//! Tables, the history view and the MariaDB enactment procedure are rendered
//! from [`StoreCapabilities`], so the same definitions serve every vendor.

use super::query::{ACTIVE_END_CONDITION, overlap_condition};
use super::vendor::StoreCapabilities;

/// Prefixed names of every schema object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub punishments: String,
    pub revocations: String,
    pub singular_active: String,
    pub history: String,
    pub enact_procedure: String,
}

impl Tables {
    #[must_use]
    pub fn new(capabilities: &StoreCapabilities) -> Self {
        Self {
            punishments: capabilities.table("punishments"),
            revocations: capabilities.table("revocations"),
            singular_active: capabilities.table("singular_active"),
            history: capabilities.table("simple_history"),
            enact_procedure: capabilities.table("enact_singular"),
        }
    }
}

/// Statements creating tables, indexes and the history view, in order
#[must_use]
pub fn create_statements(capabilities: &StoreCapabilities, tables: &Tables) -> Vec<String> {
    let dialect = &capabilities.dialect;
    let bigint = capabilities.bigint();
    let smallint = capabilities.smallint();
    let options = dialect.table_options;

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {punishments} (\
             {id_column}, \
             punishment_type {smallint} NOT NULL, \
             victim_type {smallint} NOT NULL, \
             victim_uuid {uuid} NOT NULL, \
             victim_address {address} NOT NULL, \
             operator {uuid} NOT NULL, \
             reason {long_text} NOT NULL, \
             scope_type {smallint} NOT NULL, \
             scope {short_text} NOT NULL, \
             start_time {bigint} NOT NULL, \
             end_time {bigint} NOT NULL, \
             track_namespace {short_text} NULL, \
             track_value {short_text} NULL){options}",
            punishments = tables.punishments,
            id_column = capabilities.id_column(),
            uuid = dialect.uuid_type,
            address = dialect.address_type,
            short_text = dialect.short_text_type,
            long_text = dialect.long_text_type,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {revocations} (\
             id {bigint} NOT NULL PRIMARY KEY, \
             undo_operator {uuid} NOT NULL, \
             undo_reason {long_text} NOT NULL, \
             undo_time {bigint} NOT NULL, \
             FOREIGN KEY (id) REFERENCES {punishments} (id) ON DELETE CASCADE){options}",
            revocations = tables.revocations,
            punishments = tables.punishments,
            uuid = dialect.uuid_type,
            long_text = dialect.long_text_type,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {singular} (\
             id {bigint} NOT NULL PRIMARY KEY, \
             punishment_type {smallint} NOT NULL, \
             victim_type {smallint} NOT NULL, \
             victim_uuid {uuid} NOT NULL, \
             victim_address {address} NOT NULL, \
             end_time {bigint} NOT NULL, \
             CONSTRAINT {singular}_victim_uniqueness \
             UNIQUE (punishment_type, victim_type, victim_uuid, victim_address), \
             FOREIGN KEY (id) REFERENCES {punishments} (id) ON DELETE CASCADE){options}",
            singular = tables.singular_active,
            punishments = tables.punishments,
            uuid = dialect.uuid_type,
            address = dialect.address_type,
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_uuid_index ON {table} (victim_uuid)",
            table = tables.punishments
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_address_index ON {table} (victim_address)",
            table = tables.punishments
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_start_index ON {table} (start_time)",
            table = tables.punishments
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {table}_address_index ON {table} (victim_address)",
            table = tables.singular_active
        ),
        format!(
            "{create_view} {history} AS SELECT \
             p.id AS id, p.punishment_type AS punishment_type, \
             p.victim_type AS victim_type, p.victim_uuid AS victim_uuid, \
             p.victim_address AS victim_address, p.operator AS operator, \
             p.reason AS reason, p.scope_type AS scope_type, p.scope AS scope, \
             p.start_time AS start_time, p.end_time AS end_time, \
             p.track_namespace AS track_namespace, p.track_value AS track_value, \
             r.undo_operator AS undo_operator, r.undo_reason AS undo_reason, \
             r.undo_time AS undo_time \
             FROM {punishments} p LEFT JOIN {revocations} r ON p.id = r.id",
            create_view = dialect.create_view,
            history = tables.history,
            punishments = tables.punishments,
            revocations = tables.revocations,
        ),
    ]
}

/// Statement dropping the enactment procedure so it can be recreated
#[must_use]
pub fn drop_enact_procedure(tables: &Tables) -> String {
    format!("DROP PROCEDURE IF EXISTS {}", tables.enact_procedure)
}

/// The MariaDB procedure enacting a singular punishment atomically.
///
/// It yields one row `(id, start_time)`; `id` is NULL when an overlapping
/// active punishment of the same type already exists.
#[must_use]
pub fn create_enact_procedure(capabilities: &StoreCapabilities, tables: &Tables) -> String {
    let dialect = &capabilities.dialect;
    let bigint = capabilities.bigint();
    let smallint = capabilities.smallint();
    let overlap = overlap_condition("p_uuid_component", "p_address_component");
    let active_end = ACTIVE_END_CONDITION.replace('?', "v_now");

    format!(
        "CREATE PROCEDURE {procedure} (\
         IN p_type {smallint}, IN p_victim_type {smallint}, \
         IN p_victim_uuid {uuid}, IN p_victim_address {address}, \
         IN p_uuid_component {uuid}, IN p_address_component {address}, \
         IN p_operator {uuid}, IN p_reason {long_text}, \
         IN p_scope_type {smallint}, IN p_scope {short_text}, \
         IN p_duration {bigint}, \
         IN p_track_namespace {short_text}, IN p_track_value {short_text}) \
         BEGIN \
         DECLARE v_now {bigint} DEFAULT UNIX_TIMESTAMP(); \
         DECLARE v_end {bigint} DEFAULT 0; \
         DECLARE v_existing INT DEFAULT 0; \
         DECLARE v_id {bigint} DEFAULT NULL; \
         DECLARE EXIT HANDLER FOR SQLEXCEPTION BEGIN ROLLBACK; RESIGNAL; END; \
         IF p_duration > 0 THEN SET v_end = v_now + p_duration; END IF; \
         START TRANSACTION; \
         DELETE FROM {singular} WHERE punishment_type = p_type \
         AND end_time <> 0 AND end_time <= v_now AND {overlap}; \
         SELECT COUNT(*) INTO v_existing FROM {singular} \
         WHERE punishment_type = p_type AND {overlap} AND {active_end} FOR UPDATE; \
         IF v_existing = 0 THEN \
         INSERT INTO {punishments} (punishment_type, victim_type, victim_uuid, victim_address, \
         operator, reason, scope_type, scope, start_time, end_time, track_namespace, track_value) \
         VALUES (p_type, p_victim_type, p_victim_uuid, p_victim_address, p_operator, p_reason, \
         p_scope_type, p_scope, v_now, v_end, p_track_namespace, p_track_value); \
         SET v_id = LAST_INSERT_ID(); \
         INSERT INTO {singular} (id, punishment_type, victim_type, victim_uuid, victim_address, end_time) \
         VALUES (v_id, p_type, p_victim_type, p_victim_uuid, p_victim_address, v_end); \
         COMMIT; \
         ELSE \
         ROLLBACK; \
         END IF; \
         SELECT v_id AS id, v_now AS start_time; \
         END",
        procedure = tables.enact_procedure,
        singular = tables.singular_active,
        punishments = tables.punishments,
        uuid = dialect.uuid_type,
        address = dialect.address_type,
        short_text = dialect.short_text_type,
        long_text = dialect.long_text_type,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Vendor;

    #[test]
    fn test_table_names_are_prefixed() {
        let tables = Tables::new(&Vendor::Sqlite.capabilities("warden_"));
        assert_eq!(tables.punishments, "warden_punishments");
        assert_eq!(tables.history, "warden_simple_history");
        assert_eq!(tables.enact_procedure, "warden_enact_singular");
    }

    #[test]
    fn test_sqlite_statements() {
        let capabilities = Vendor::Sqlite.capabilities("");
        let tables = Tables::new(&capabilities);
        let statements = create_statements(&capabilities, &tables);

        assert!(statements[0].contains("id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT"));
        assert!(!statements.iter().any(|s| s.contains("UNSIGNED")));
        assert!(statements.iter().any(|s| s.starts_with("CREATE VIEW IF NOT EXISTS simple_history")));
        assert!(statements[2].contains("UNIQUE (punishment_type, victim_type, victim_uuid, victim_address)"));
    }

    #[test]
    fn test_mariadb_procedure() {
        let capabilities = Vendor::MariaDb.capabilities("warden_");
        let tables = Tables::new(&capabilities);
        let procedure = create_enact_procedure(&capabilities, &tables);

        assert!(procedure.starts_with("CREATE PROCEDURE warden_enact_singular"));
        assert!(procedure.contains("p_type SMALLINT UNSIGNED"));
        assert!(procedure.contains("victim_uuid = p_uuid_component"));
        assert!(procedure.contains("end_time > v_now"));
        assert!(!procedure.contains('?'));
        assert_eq!(
            drop_enact_procedure(&tables),
            "DROP PROCEDURE IF EXISTS warden_enact_singular"
        );
    }
}
