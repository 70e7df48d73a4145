// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-tenant concurrency admission.
//!
//! Two gates share the same ceiling: run creation counts non-terminal runs,
//! step claiming counts RUNNING steps. Both are evaluated inside the
//! caller's transaction so the counts are consistent with any row locks the
//! caller holds.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::{RunStatus, StepStatus, DEFAULT_MAX_CONCURRENT_RUNS};
use crate::error::{CoreError, Result};

/// The ceiling to enforce, defaulting when the stored value is not positive.
pub fn effective_limit(stored: i32) -> i64 {
    if stored > 0 {
        i64::from(stored)
    } else {
        i64::from(DEFAULT_MAX_CONCURRENT_RUNS)
    }
}

/// Count the tenant's runs in {RUNNING, WAITING_APPROVAL}.
///
/// Used by run creation, under the tenant row lock.
pub async fn active_run_count(conn: &mut PgConnection, tenant_id: Uuid) -> Result<i64> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM runs
        WHERE tenant_id = $1
          AND status IN ($2, $3)
        "#,
    )
    .bind(tenant_id)
    .bind(RunStatus::Running.as_str())
    .bind(RunStatus::WaitingApproval.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| CoreError::storage("count active runs", e))
}

/// Count the tenant's steps currently RUNNING, across all of its runs.
///
/// Used as the pre-selection gate in the step claim transaction.
pub async fn running_step_count(conn: &mut PgConnection, tenant_id: Uuid) -> Result<i64> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM steps st
        JOIN runs r ON st.run_id = r.id
        WHERE r.tenant_id = $1
          AND st.status = $2
        "#,
    )
    .bind(tenant_id)
    .bind(StepStatus::Running.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| CoreError::storage("count running steps", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit_defaults_non_positive() {
        assert_eq!(effective_limit(0), i64::from(DEFAULT_MAX_CONCURRENT_RUNS));
        assert_eq!(effective_limit(-3), i64::from(DEFAULT_MAX_CONCURRENT_RUNS));
        assert_eq!(effective_limit(1), 1);
        assert_eq!(effective_limit(20), 20);
    }
}
