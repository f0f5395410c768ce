//! Schema migrations for the standards store.
//!
//! Each step is a SQL script tagged with the `user_version` it produces.
//! Pending steps run inside one IMMEDIATE transaction, and the stored version
//! is re-read after the write lock is held, so two processes opening a fresh
//! file at the same time apply every script exactly once.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, Transaction, TransactionBehavior};

#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "standards_tree",
        sql: include_str!("0001_standards_tree.sql"),
    },
    SchemaStep {
        version: 2,
        name: "correlations",
        sql: include_str!("0002_correlations.sql"),
    },
];

/// Schema version produced by the newest bundled step.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Reads `PRAGMA user_version` from `conn`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

/// Brings `conn` up to [`latest_version`].
///
/// Returns the number of steps applied; zero when the schema is current.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let latest = latest_version();
    if check_supported(schema_version(conn)?, latest)? == latest {
        return Ok(0);
    }

    let tx = Transaction::new(conn, TransactionBehavior::Immediate)?;
    let found = check_supported(schema_version(&tx)?, latest)?;
    let pending: Vec<&SchemaStep> = STEPS.iter().filter(|step| step.version > found).collect();
    for step in &pending {
        tx.execute_batch(step.sql)
            .and_then(|()| tx.pragma_update(None, "user_version", step.version))
            .map_err(|source| DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            })?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    Ok(pending.len())
}

fn check_supported(found: u32, latest: u32) -> DbResult<u32> {
    if found > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: found,
            latest_supported: latest,
        });
    }
    Ok(found)
}
