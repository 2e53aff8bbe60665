//! Table blueprints and catalog introspection.

use regdesk_common::{AcademicLevel, Choice, HowHeard, IasCourse, UserType};

use crate::connection::{self, Connection};
use crate::dialect::quote_ident;
use crate::endpoint::BackendKind;
use crate::error::DbError;

pub const REGISTRATION_TABLE: &str = "registrationform";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Serial,
    Text,
    Choice {
        type_name: &'static str,
        labels: Vec<&'static str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn serial_key(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Serial,
            nullable: false,
        }
    }

    pub fn text(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Text,
            nullable: false,
        }
    }

    pub fn choice<C: Choice>(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Choice {
                type_name: C::TYPE_NAME,
                labels: C::labels(),
            },
            nullable: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Full column definition as it appears inside `CREATE TABLE` or
    /// `ADD COLUMN`.
    pub fn definition(&self, backend: BackendKind) -> String {
        let ident = quote_ident(self.name);
        let ty = match &self.ty {
            ColumnType::Serial => return format!("{ident} {}", backend.serial_primary_key()),
            ColumnType::Text => "VARCHAR".to_string(),
            ColumnType::Choice { type_name, labels } => {
                backend.choice_column_type(self.name, type_name, labels)
            }
        };
        if self.nullable {
            format!("{ident} {ty}")
        } else {
            format!("{ident} {ty} NOT NULL")
        }
    }

    /// Statement creating this column's enumerated type, if it has one.
    pub fn type_statement(&self, backend: BackendKind) -> Option<String> {
        match &self.ty {
            ColumnType::Choice { type_name, labels } => {
                backend.create_choice_type(type_name, labels)
            }
            _ => None,
        }
    }
}

/// The shape of one table: used as a creation blueprint, never diffed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub table: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl SchemaDescriptor {
    /// The registration table as the live data model defines it.
    pub fn registration() -> Self {
        Self {
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
                ColumnSpec::choice::<IasCourse>("ias_course").optional(),
            ],
        }
    }

    /// Enumerated type statements (skip-if-exists) followed by the table.
    pub fn create_statements(&self, backend: BackendKind) -> Vec<String> {
        let mut statements: Vec<String> = Vec::new();
        for column in &self.columns {
            if let Some(sql) = column.type_statement(backend) {
                if !statements.contains(&sql) {
                    statements.push(sql);
                }
            }
        }

        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.definition(backend)))
            .collect::<Vec<_>>()
            .join(",\n");
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{columns}\n)",
            quote_ident(self.table)
        ));
        statements
    }

    /// Drop the table and then every enumerated type it referenced.
    pub fn drop_statements(&self, backend: BackendKind) -> Vec<String> {
        let mut statements = vec![format!("DROP TABLE IF EXISTS {}", quote_ident(self.table))];
        for column in self.columns.iter().rev() {
            if let ColumnType::Choice { type_name, .. } = &column.ty {
                if let Some(sql) = backend.drop_choice_type(type_name) {
                    statements.push(sql);
                }
            }
        }
        statements
    }
}

pub async fn table_exists(conn: &mut dyn Connection, table: &str) -> Result<bool, DbError> {
    let sql = conn.backend().table_exists_query();
    connection::exists(conn, &sql, table).await
}

pub async fn table_columns(conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, DbError> {
    let sql = conn.backend().table_columns_query();
    let rows = conn.query(&sql, &[Some(table)]).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.into_iter().next().flatten())
        .collect())
}
