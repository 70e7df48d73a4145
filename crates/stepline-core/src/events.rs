// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Append-only event journal.
//!
//! Every observable transition appends a row to `events`. The `seq` column
//! (BIGSERIAL) is the authoritative cursor for streaming consumers: it is
//! globally monotonic, and within committed work strictly ordered. Consumers
//! may observe gaps from aborted transactions; they must key resumption on
//! `seq`, never on row counts.
//!
//! Events are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Event type constants.
pub mod event_type {
    /// A worker claimed a step (fresh or reclaim).
    pub const STEP_CLAIMED: &str = "STEP_CLAIMED";
    /// A step finished successfully.
    pub const STEP_SUCCEEDED: &str = "STEP_SUCCEEDED";
    /// A step exhausted its attempts.
    pub const STEP_FAILED: &str = "STEP_FAILED";
    /// A step failed and was rescheduled with a retry deadline.
    pub const STEP_FAILED_RETRY: &str = "STEP_FAILED_RETRY";
    /// The approval step is now waiting on an external decision.
    pub const STEP_WAITING_APPROVAL: &str = "STEP_WAITING_APPROVAL";
    /// The approval step was approved.
    pub const STEP_APPROVED: &str = "STEP_APPROVED";
    /// The run's approval was recorded.
    pub const RUN_APPROVED: &str = "RUN_APPROVED";
    /// The run was canceled by its tenant.
    pub const RUN_CANCELED: &str = "RUN_CANCELED";
}

/// One journal record, shaped exactly as the SSE stream emits it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    /// Event identifier (UUID cursor alternative).
    pub id: Uuid,
    /// Dense ascending sequence number; the streaming cursor.
    pub seq: i64,
    /// Owning run.
    pub run_id: Uuid,
    /// Event type string, one of [`event_type`].
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque JSON payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// When the event was appended.
    pub created_at: DateTime<Utc>,
}

/// Append an event inside the caller's transaction.
///
/// The sequence number is assigned at insert; callers in one transaction get
/// strictly increasing values in call order.
pub async fn insert_event(
    conn: &mut PgConnection,
    run_id: Uuid,
    step_id: Option<Uuid>,
    event_type: &str,
    payload: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO events (id, run_id, step_id, type, payload)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(run_id)
    .bind(step_id)
    .bind(event_type)
    .bind(payload)
    .execute(conn)
    .await
    .map_err(|e| CoreError::storage("insert event", e))?;

    Ok(())
}

/// Read access to the journal, tenant-scoped.
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    /// Create a repository over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List a run's events with `seq > after_seq`, oldest first.
    ///
    /// Fails with not-found when the run is not owned by the tenant, so the
    /// stream endpoint never leaks cross-tenant existence.
    pub async fn list_after(
        &self,
        tenant_id: Uuid,
        run_id: Uuid,
        after_seq: i64,
    ) -> Result<Vec<EventRecord>> {
        self.check_run_ownership(tenant_id, run_id).await?;

        let events = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT e.id, e.seq, e.run_id, e.type, e.payload, e.created_at
            FROM events e
            WHERE e.run_id = $1
              AND e.seq > $2
            ORDER BY e.seq ASC
            "#,
        )
        .bind(run_id)
        .bind(after_seq)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(run_id = %run_id, error = %e, "list events query failed");
            CoreError::storage("list events", e)
        })?;

        Ok(events)
    }

    /// Resolve an event UUID to its sequence number, for clients resuming
    /// from an event id instead of a numeric cursor.
    pub async fn resolve_cursor(
        &self,
        tenant_id: Uuid,
        run_id: Uuid,
        event_id: Uuid,
    ) -> Result<i64> {
        let seq: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT e.seq
            FROM events e
            JOIN runs r ON e.run_id = r.id
            WHERE e.id = $1
              AND e.run_id = $2
              AND r.tenant_id = $3
            "#,
        )
        .bind(event_id)
        .bind(run_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(run_id = %run_id, event_id = %event_id, error = %e, "resolve event cursor failed");
            CoreError::storage("resolve event cursor", e)
        })?;

        seq.ok_or(CoreError::NotFound)
    }

    async fn check_run_ownership(&self, tenant_id: Uuid, run_id: Uuid) -> Result<()> {
        let owned: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM runs WHERE id = $1 AND tenant_id = $2")
                .bind(run_id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::storage("run ownership check", e))?;

        if owned.is_none() {
            warn!(run_id = %run_id, "event read denied: run not owned");
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}
