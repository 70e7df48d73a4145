// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for stepline-core integration tests.
//!
//! Tests need a PostgreSQL database reachable via `TEST_DATABASE_URL`; they
//! skip silently when it is not set.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Test context holding a database pool with the schema applied.
pub struct TestContext {
    pub pool: PgPool,
}

impl TestContext {
    /// Connect to `TEST_DATABASE_URL` and run the schema bootstrap.
    /// Returns `None` when the variable is unset or the database is down.
    pub async fn new() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&database_url).await.ok()?;
        stepline_core::schema::ensure_schema(&pool).await.ok()?;
        Some(Self { pool })
    }

    /// Insert a tenant directly and return its id.
    pub async fn create_test_tenant(&self, max_concurrent_runs: i32) -> Uuid {
        let tenant_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, token_hash, max_concurrent_runs, max_requests_per_min)
            VALUES ($1, $2, $3, $4, 60)
            "#,
        )
        .bind(tenant_id)
        .bind(format!("test-tenant-{}", tenant_id))
        .bind(format!("hash-{}", tenant_id))
        .bind(max_concurrent_runs)
        .execute(&self.pool)
        .await
        .expect("Failed to create test tenant");
        tenant_id
    }

    /// Current status string of a run, bypassing tenant scoping.
    pub async fn run_status(&self, run_id: Uuid) -> String {
        sqlx::query_scalar("SELECT status FROM runs WHERE id = $1")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read run status")
    }

    /// `(name, status, attempts)` rows of a run's steps in creation order.
    pub async fn step_rows(&self, run_id: Uuid) -> Vec<(String, String, i32)> {
        sqlx::query_as(
            "SELECT name, status, attempts FROM steps WHERE run_id = $1 ORDER BY created_at ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .expect("Failed to read steps")
    }

    /// Force a step of the given name into a status (test fixture surgery).
    pub async fn force_step_status(&self, run_id: Uuid, name: &str, status: &str) {
        sqlx::query("UPDATE steps SET status = $3 WHERE run_id = $1 AND name = $2")
            .bind(run_id)
            .bind(name)
            .bind(status)
            .execute(&self.pool)
            .await
            .expect("Failed to force step status");
    }

    /// Force a run into a status.
    pub async fn force_run_status(&self, run_id: Uuid, status: &str) {
        sqlx::query("UPDATE runs SET status = $2 WHERE id = $1")
            .bind(run_id)
            .bind(status)
            .execute(&self.pool)
            .await
            .expect("Failed to force run status");
    }

    /// Event `(seq, type)` pairs for a run in sequence order.
    pub async fn event_rows(&self, run_id: Uuid) -> Vec<(i64, String)> {
        sqlx::query_as("SELECT seq, type FROM events WHERE run_id = $1 ORDER BY seq ASC")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .expect("Failed to read events")
    }

    /// `run_requests` row count for one `(tenant, key)` pair.
    pub async fn run_request_count(&self, tenant_id: Uuid, key: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM run_requests WHERE tenant_id = $1 AND idempotency_key = $2",
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to count run requests")
    }

    /// Claimed-at / retry-deadline columns of a step.
    pub async fn step_schedule(
        &self,
        run_id: Uuid,
        name: &str,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        sqlx::query_as(
            "SELECT started_at, next_run_at FROM steps WHERE run_id = $1 AND name = $2",
        )
        .bind(run_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to read step schedule")
    }
}

/// Skip the current test when no test database is configured.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}
