//! Per-backend SQL fragments. Everything that differs between PostgreSQL
//! and SQLite is rendered here so the startup components stay backend-neutral.

use crate::endpoint::BackendKind;

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn literal_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|v| quote_literal(v))
        .collect::<Vec<_>>()
        .join(", ")
}

impl BackendKind {
    /// Positional parameter marker for the `n`th (1-based) bind value.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            BackendKind::Postgres => format!("${n}"),
            BackendKind::Sqlite => format!("?{n}"),
        }
    }

    /// Bind value destined for an enumerated column. Values travel as text.
    pub fn choice_placeholder(self, n: usize, type_name: &str) -> String {
        match self {
            BackendKind::Postgres => {
                format!("CAST(CAST(${n} AS TEXT) AS {})", quote_ident(type_name))
            }
            BackendKind::Sqlite => self.placeholder(n),
        }
    }

    pub fn serial_primary_key(self) -> &'static str {
        match self {
            BackendKind::Postgres => "SERIAL PRIMARY KEY",
            BackendKind::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    /// Create a named enumerated type unless one already exists. SQLite has
    /// no such types; its columns carry a `CHECK` constraint instead.
    pub fn create_choice_type(self, type_name: &str, labels: &[&str]) -> Option<String> {
        match self {
            BackendKind::Postgres => Some(format!(
                "DO $$\nBEGIN\n    IF NOT EXISTS (SELECT 1 FROM pg_type WHERE typname = {name}) THEN\n        CREATE TYPE {ident} AS ENUM ({labels});\n    END IF;\nEND$$;",
                name = quote_literal(type_name),
                ident = quote_ident(type_name),
                labels = literal_list(labels),
            )),
            BackendKind::Sqlite => None,
        }
    }

    pub fn drop_choice_type(self, type_name: &str) -> Option<String> {
        match self {
            BackendKind::Postgres => Some(format!("DROP TYPE IF EXISTS {}", quote_ident(type_name))),
            BackendKind::Sqlite => None,
        }
    }

    /// Column type for an enumerated column named `column`.
    pub fn choice_column_type(self, column: &str, type_name: &str, labels: &[&str]) -> String {
        match self {
            BackendKind::Postgres => quote_ident(type_name),
            BackendKind::Sqlite => format!(
                "VARCHAR CHECK ({} IN ({}))",
                quote_ident(column),
                literal_list(labels)
            ),
        }
    }

    pub fn add_column(self, table: &str, column_definition: &str) -> String {
        match self {
            BackendKind::Postgres => format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {column_definition}",
                quote_ident(table)
            ),
            BackendKind::Sqlite => format!(
                "ALTER TABLE {} ADD COLUMN {column_definition}",
                quote_ident(table)
            ),
        }
    }

    pub fn drop_column(self, table: &str, column: &str) -> String {
        match self {
            BackendKind::Postgres => format!(
                "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
                quote_ident(table),
                quote_ident(column)
            ),
            BackendKind::Sqlite => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(table),
                quote_ident(column)
            ),
        }
    }

    /// Single-parameter query yielding one row per matching table.
    pub fn table_exists_query(self) -> String {
        match self {
            BackendKind::Postgres => "SELECT CAST(tablename AS TEXT) FROM pg_catalog.pg_tables \
                 WHERE schemaname = current_schema() AND tablename = $1"
                .to_string(),
            BackendKind::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1".to_string()
            }
        }
    }

    /// Single-parameter query yielding the table's column names in order.
    pub fn table_columns_query(self) -> String {
        match self {
            BackendKind::Postgres => "SELECT CAST(column_name AS TEXT) FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position"
                .to_string(),
            BackendKind::Sqlite => "SELECT name FROM pragma_table_info(?1) ORDER BY cid".to_string(),
        }
    }

    pub fn ledger_table_ddl(self, table: &str) -> String {
        let applied_at = match self {
            BackendKind::Postgres => "TIMESTAMPTZ NOT NULL DEFAULT now()",
            BackendKind::Sqlite => "TEXT NOT NULL DEFAULT (datetime('now'))",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    migration_id VARCHAR(64) PRIMARY KEY,\n    applied_at {applied_at}\n)",
            quote_ident(table)
        )
    }
}

/// Catalog lookup for a database by name (PostgreSQL only).
pub const DATABASE_EXISTS_QUERY: &str =
    "SELECT CAST(datname AS TEXT) FROM pg_catalog.pg_database WHERE datname = $1";

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE {}", quote_ident(name))
}
