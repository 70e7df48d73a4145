// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Schema bootstrap for stepline-core.
//!
//! Migrations are embedded in the binary and applied on startup under a
//! PostgreSQL advisory lock, so any number of workers and API processes can
//! race at boot without corrupting the schema. Applied filenames are recorded
//! in `schema_migrations(filename, applied_at)`; each script runs in its own
//! transaction and is skipped once recorded.

use sqlx::postgres::PgConnection;
use sqlx::{Connection, PgPool};
use tracing::{error, info};

use crate::error::{CoreError, Result};

// "SL_MIGR8" as an advisory lock key.
const SCHEMA_MIGRATION_LOCK_ID: i64 = 0x534c_5f4d_4947_5238;

/// One embedded migration script.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Filename recorded in `schema_migrations`.
    pub name: &'static str,
    /// Script body; may contain multiple statements.
    pub sql: &'static str,
}

/// Embedded migrations in apply order (lexicographic by filename).
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_tenants.sql",
        sql: include_str!("../migrations/0001_tenants.sql"),
    },
    Migration {
        name: "0002_runs.sql",
        sql: include_str!("../migrations/0002_runs.sql"),
    },
    Migration {
        name: "0003_steps.sql",
        sql: include_str!("../migrations/0003_steps.sql"),
    },
    Migration {
        name: "0004_events.sql",
        sql: include_str!("../migrations/0004_events.sql"),
    },
    Migration {
        name: "0005_run_requests.sql",
        sql: include_str!("../migrations/0005_run_requests.sql"),
    },
    Migration {
        name: "0006_workflow_templates.sql",
        sql: include_str!("../migrations/0006_workflow_templates.sql"),
    },
    Migration {
        name: "0007_indexes.sql",
        sql: include_str!("../migrations/0007_indexes.sql"),
    },
    Migration {
        name: "0008_default_template.sql",
        sql: include_str!("../migrations/0008_default_template.sql"),
    },
];

const REQUIRED_TABLES: &[&str] = &[
    "tenants",
    "runs",
    "steps",
    "events",
    "run_requests",
    "workflow_templates",
    "workflow_template_steps",
];

const REQUIRED_COLUMNS: &[(&str, &str)] = &[
    ("tenants", "token_hash"),
    ("tenants", "max_concurrent_runs"),
    ("runs", "priority"),
    ("runs", "webhook_secret"),
    ("steps", "next_run_at"),
    ("events", "seq"),
];

/// Apply all unapplied embedded migrations, serialized across processes by
/// an advisory lock, then validate the schema with [`schema_ready`].
///
/// Safe to call on every startup; already-applied migrations are skipped.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    info!("schema bootstrap starting");

    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| CoreError::storage("acquire bootstrap connection", e))?;

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(SCHEMA_MIGRATION_LOCK_ID)
        .execute(&mut *conn)
        .await
        .map_err(|e| CoreError::storage("acquire schema lock", e))?;

    // Hold the lock for the whole apply pass; release it on success and
    // failure alike before surfacing the result.
    let applied = apply_pending(&mut *conn).await;

    if let Err(unlock_err) = sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(SCHEMA_MIGRATION_LOCK_ID)
        .execute(&mut *conn)
        .await
    {
        error!(error = %unlock_err, "schema bootstrap unlock failed");
    }

    let (applied, skipped) = applied?;
    info!(applied, skipped, "schema bootstrap complete");

    schema_ready(pool).await
}

async fn apply_pending(conn: &mut PgConnection) -> Result<(usize, usize)> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            filename TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(&mut *conn)
    .await
    .map_err(|e| CoreError::storage("create schema_migrations", e))?;

    let mut applied = 0;
    let mut skipped = 0;

    for migration in MIGRATIONS {
        let already_applied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE filename = $1)",
        )
        .bind(migration.name)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| CoreError::storage("check migration", e))?;

        if already_applied {
            skipped += 1;
            continue;
        }

        info!(file = migration.name, "applying migration");
        apply_one(conn, migration)
            .await
            .map_err(|e| CoreError::storage(migration.name, e))?;
        applied += 1;
    }

    Ok((applied, skipped))
}

async fn apply_one(conn: &mut PgConnection, migration: &Migration) -> sqlx::Result<()> {
    let mut tx = conn.begin().await?;

    sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
    sqlx::query("INSERT INTO schema_migrations (filename) VALUES ($1)")
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

/// Verify that every required table and column exists.
///
/// Called after bootstrap and usable as a readiness probe: a process must not
/// serve traffic against a partially migrated database.
pub async fn schema_ready(pool: &PgPool) -> Result<()> {
    let mut missing_tables = Vec::new();
    for table in REQUIRED_TABLES {
        let relation: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(format!("public.{}", table))
            .fetch_one(pool)
            .await
            .map_err(|e| CoreError::storage("check table", e))?;
        if relation.map_or(true, |r| r.trim().is_empty()) {
            missing_tables.push(*table);
        }
    }
    if !missing_tables.is_empty() {
        return Err(CoreError::Storage {
            operation: "schema_ready".to_string(),
            details: format!("required tables missing: {}", missing_tables.join(", ")),
        });
    }

    let mut missing_columns = Vec::new();
    for (table, column) in REQUIRED_COLUMNS {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM information_schema.columns
                WHERE table_schema = 'public'
                  AND table_name = $1
                  AND column_name = $2
            )
            "#,
        )
        .bind(table)
        .bind(column)
        .fetch_one(pool)
        .await
        .map_err(|e| CoreError::storage("check column", e))?;
        if !exists {
            missing_columns.push(format!("{}.{}", table, column));
        }
    }
    if !missing_columns.is_empty() {
        return Err(CoreError::Storage {
            operation: "schema_ready".to_string(),
            details: format!("required columns missing: {}", missing_columns.join(", ")),
        });
    }

    Ok(())
}
