//! Versioned schema changes for the registration table.
//!
//! Each migration names the one it revises, forming a single chain from the
//! root to the head. Forward actions must be safe to re-run: a failed
//! migration is never recorded, so the next start repeats it from scratch.

use regdesk_common::{AcademicLevel, Choice, HowHeard, IasCourse, UserType};

use crate::dialect::quote_ident;
use crate::endpoint::BackendKind;
use crate::schema::{ColumnSpec, REGISTRATION_TABLE, SchemaDescriptor};

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    /// The migration this one revises; `None` only for the root.
    pub predecessor: Option<&'static str>,
    pub description: &'static str,
    pub forward: fn(BackendKind) -> Vec<String>,
    pub reverse: fn(BackendKind) -> Vec<String>,
    /// `(table, column)` this migration adds. When the column is already
    /// there the forward actions are skipped and only the ledger is updated.
    pub adds_column: Option<(&'static str, &'static str)>,
}

/// Every migration shipped with this build, in no particular order.
pub fn registered() -> Vec<Migration> {
    vec![INITIAL_REGISTRATION_FORM, ADD_IAS_COURSE]
}

pub const INITIAL_REGISTRATION_FORM: Migration = Migration {
    id: "0001",
    predecessor: None,
    description: "create registrationform and its enumerated types",
    forward: initial_forward,
    reverse: initial_reverse,
    adds_column: None,
};

pub const ADD_IAS_COURSE: Migration = Migration {
    id: "0002",
    predecessor: Some("0001"),
    description: "add optional ias_course column",
    forward: ias_course_forward,
    reverse: ias_course_reverse,
    adds_column: Some((REGISTRATION_TABLE, IAS_COURSE)),
};

const IAS_COURSE: &str = "ias_course";

fn initial_table() -> SchemaDescriptor {
    SchemaDescriptor {
        table: REGISTRATION_TABLE,
        columns: vec![
            ColumnSpec::serial_key("id"),
            ColumnSpec::text("first_name"),
            ColumnSpec::text("middle_name").optional(),
            ColumnSpec::text("last_name"),
            ColumnSpec::text("university_id").optional(),
            ColumnSpec::text("phone"),
            ColumnSpec::text("email").optional(),
            ColumnSpec::choice::<UserType>("user_type"),
            ColumnSpec::choice::<AcademicLevel>("academic_level"),
            ColumnSpec::choice::<HowHeard>("how_heard"),
        ],
    }
}

fn initial_forward(backend: BackendKind) -> Vec<String> {
    initial_table().create_statements(backend)
}

fn initial_reverse(backend: BackendKind) -> Vec<String> {
    initial_table().drop_statements(backend)
}

fn ias_course_column() -> ColumnSpec {
    ColumnSpec::choice::<IasCourse>(IAS_COURSE).optional()
}

fn ias_course_forward(backend: BackendKind) -> Vec<String> {
    let column = ias_course_column();
    let mut statements: Vec<String> = column.type_statement(backend).into_iter().collect();
    statements.push(backend.add_column(REGISTRATION_TABLE, &column.definition(backend)));
    statements
}

fn ias_course_reverse(backend: BackendKind) -> Vec<String> {
    let mut statements = vec![backend.drop_column(REGISTRATION_TABLE, IAS_COURSE)];
    statements.extend(backend.drop_choice_type(IasCourse::TYPE_NAME));
    statements
}

/// Name of the ledger table recording applied migration identifiers.
pub const LEDGER_TABLE: &str = "regdesk_migrations";

pub(crate) fn ledger_append(id: &str) -> String {
    format!(
        "INSERT INTO {} (migration_id) VALUES ({})",
        quote_ident(LEDGER_TABLE),
        crate::dialect::quote_literal(id)
    )
}

pub(crate) fn ledger_remove(id: &str) -> String {
    format!(
        "DELETE FROM {} WHERE migration_id = {}",
        quote_ident(LEDGER_TABLE),
        crate::dialect::quote_literal(id)
    )
}

pub(crate) fn ledger_contains_query(backend: BackendKind) -> String {
    format!(
        "SELECT migration_id FROM {} WHERE migration_id = {}",
        quote_ident(LEDGER_TABLE),
        backend.placeholder(1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_rooted_and_linked() {
        let migrations = registered();
        assert_eq!(migrations.len(), 2);
        assert!(INITIAL_REGISTRATION_FORM.predecessor.is_none());
        assert_eq!(ADD_IAS_COURSE.predecessor, Some(INITIAL_REGISTRATION_FORM.id));
    }

    #[test]
    fn head_migration_reaches_the_live_model() {
        let mut cumulative = initial_table();
        cumulative.columns.push(ias_course_column());
        assert_eq!(cumulative, SchemaDescriptor::registration());
    }

    #[test]
    fn ias_course_forward_guards_type_creation_on_postgres() {
        let statements = (ADD_IAS_COURSE.forward)(BackendKind::Postgres);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("IF NOT EXISTS (SELECT 1 FROM pg_type"));
        assert!(statements[1].contains("ADD COLUMN IF NOT EXISTS \"ias_course\" \"iascourse\""));

        let statements = (ADD_IAS_COURSE.forward)(BackendKind::Sqlite);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("CHECK (\"ias_course\" IN ('IAS 111'"));
    }

    #[test]
    fn reverse_actions_undo_in_opposite_order() {
        let statements = (ADD_IAS_COURSE.reverse)(BackendKind::Postgres);
        assert!(statements[0].contains("DROP COLUMN IF EXISTS \"ias_course\""));
        assert_eq!(statements[1], "DROP TYPE IF EXISTS \"iascourse\"");

        let statements = (INITIAL_REGISTRATION_FORM.reverse)(BackendKind::Sqlite);
        assert_eq!(statements, vec!["DROP TABLE IF EXISTS \"registrationform\""]);
    }

    #[test]
    fn ledger_statements_quote_identifiers() {
        assert_eq!(
            ledger_append("0001"),
            "INSERT INTO \"regdesk_migrations\" (migration_id) VALUES ('0001')"
        );
        assert_eq!(
            ledger_contains_query(BackendKind::Sqlite),
            "SELECT migration_id FROM \"regdesk_migrations\" WHERE migration_id = ?1"
        );
    }
}
