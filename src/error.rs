use thiserror::Error;

use crate::policy::{Operation, Table};

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("{table}.{column}: no valid row '{id}' to reference")]
    ReferentialIntegrity {
        table: &'static str,
        column: &'static str,
        id: String,
    },

    #[error("domain constraint violated: {0}")]
    DomainConstraint(String),

    #[error("{operation} on {table} denied")]
    AuthorizationDenied { table: Table, operation: Operation },

    #[error("cascade failed: {0}")]
    CascadeFailure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn missing(table: &'static str, column: &'static str, id: impl ToString) -> Self {
        Self::ReferentialIntegrity {
            table,
            column,
            id: id.to_string(),
        }
    }

    pub(crate) fn denied(table: Table, operation: Operation) -> Self {
        Self::AuthorizationDenied { table, operation }
    }

    /// Translates SQLite constraint failures into the matching domain error.
    /// Anything else stays a database error.
    pub(crate) fn from_constraint(err: rusqlite::Error, table: &'static str) -> Self {
        use rusqlite::ffi;

        if let rusqlite::Error::SqliteFailure(e, msg) = &err {
            if e.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                return Self::ReferentialIntegrity {
                    table,
                    column: "foreign key",
                    id: msg.clone().unwrap_or_default(),
                };
            }
            if e.extended_code == ffi::SQLITE_CONSTRAINT_CHECK {
                return Self::DomainConstraint(
                    msg.clone()
                        .unwrap_or_else(|| format!("check constraint on {table}")),
                );
            }
        }
        Self::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
