// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transactional run lifecycle.
//!
//! All operations are tenant-scoped: a run that exists but belongs to a
//! different tenant is reported as [`CoreError::NotFound`], never as a
//! permission error, so existence is not leaked across tenants.
//!
//! Creation is a single transaction covering idempotency lookup, admission
//! under the tenant row lock, template expansion, and the idempotency-key
//! binding. Two concurrent creates with the same key converge on one run:
//! the loser of the unique-index race re-reads the winner's binding.

use sqlx::{PgPool, Postgres, Transaction};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::admission;
use crate::domain::{
    CreateRunParams, RunCostBreakdown, RunStatus, StepCostBreakdown, StepName, StepRecord,
    StepStatus, DEFAULT_WORKFLOW_TEMPLATE_NAME,
};
use crate::error::{is_unique_violation, CoreError, Result};
use crate::events::{event_type, insert_event};
use crate::metrics;

/// Repository for the run lifecycle.
#[derive(Clone)]
pub struct RunRepository {
    pool: PgPool,
}

struct TemplateStep {
    name: StepName,
    timeout_seconds: Option<i64>,
}

impl RunRepository {
    /// Create a repository over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a run from a workflow template.
    ///
    /// With an idempotency key, a prior run bound to `(tenant, key)` is
    /// returned as-is and nothing is written. Admission is evaluated under
    /// the tenant row lock; exceeding the ceiling fails with
    /// [`CoreError::LimitExceeded`].
    pub async fn create(
        &self,
        tenant_id: Uuid,
        params: CreateRunParams,
        idempotency_key: Option<&str>,
    ) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        let webhook_url = params
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let template_name = params
            .template_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_WORKFLOW_TEMPLATE_NAME);
        let idempotency_key = idempotency_key.map(str::trim).filter(|s| !s.is_empty());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::storage("begin tx", e))?;

        if let Some(key) = idempotency_key {
            let existing: Option<Uuid> = sqlx::query_scalar(
                r#"
                SELECT run_id
                FROM run_requests
                WHERE tenant_id = $1 AND idempotency_key = $2
                "#,
            )
            .bind(tenant_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!(tenant_id = %tenant_id, idempotency_key = key, error = %e, "find idempotent run failed");
                CoreError::storage("find idempotent run", e)
            })?;

            if let Some(existing_run_id) = existing {
                return Ok(existing_run_id);
            }
        }

        let stored_limit: Option<i32> =
            sqlx::query_scalar("SELECT max_concurrent_runs FROM tenants WHERE id = $1 FOR UPDATE")
                .bind(tenant_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    error!(tenant_id = %tenant_id, error = %e, "read tenant limits failed");
                    CoreError::storage("read tenant limits", e)
                })?;
        let Some(stored_limit) = stored_limit else {
            warn!(tenant_id = %tenant_id, "create run denied: unknown tenant");
            return Err(CoreError::NotFound);
        };
        let limit = admission::effective_limit(stored_limit);

        let active = admission::active_run_count(&mut tx, tenant_id).await?;
        if active >= limit {
            warn!(
                tenant_id = %tenant_id,
                active_runs = active,
                max_concurrent_runs = limit,
                "create run blocked by concurrent run limit"
            );
            return Err(CoreError::LimitExceeded { active, limit });
        }

        sqlx::query(
            r#"
            INSERT INTO runs (id, tenant_id, status, webhook_url, priority)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(run_id)
        .bind(tenant_id)
        .bind(RunStatus::Pending.as_str())
        .bind(webhook_url)
        .bind(params.priority)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(run_id = %run_id, tenant_id = %tenant_id, error = %e, "insert run failed");
            CoreError::storage("insert run", e)
        })?;

        let template_steps = load_template_steps(&mut tx, template_name).await?;
        for step in &template_steps {
            sqlx::query(
                r#"
                INSERT INTO steps (id, run_id, name, status, timeout_seconds)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(run_id)
            .bind(step.name.as_str())
            .bind(StepStatus::Pending.as_str())
            .bind(step.timeout_seconds)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(run_id = %run_id, step = %step.name, error = %e, "insert step failed");
                CoreError::storage("insert step", e)
            })?;
        }

        if let Some(key) = idempotency_key {
            let inserted = sqlx::query(
                r#"
                INSERT INTO run_requests (id, tenant_id, idempotency_key, run_id)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(key)
            .bind(run_id)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                // Another request won the same idempotency key race; the
                // transaction is aborted, so read the winner outside of it.
                if is_unique_violation(&e) {
                    drop(tx);
                    return self.run_id_by_request(tenant_id, key).await;
                }
                error!(
                    tenant_id = %tenant_id,
                    idempotency_key = key,
                    run_id = %run_id,
                    error = %e,
                    "insert run request failed"
                );
                return Err(CoreError::storage("insert run request", e));
            }
        }

        tx.commit()
            .await
            .map_err(|e| CoreError::storage("commit create", e))?;

        metrics::inc_run_status(RunStatus::Pending.as_str());
        info!(run_id = %run_id, tenant_id = %tenant_id, "run created");
        Ok(run_id)
    }

    async fn run_id_by_request(&self, tenant_id: Uuid, idempotency_key: &str) -> Result<Uuid> {
        let run_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT run_id
            FROM run_requests
            WHERE tenant_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(tenant_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(tenant_id = %tenant_id, idempotency_key, error = %e, "fetch winner idempotent run failed");
            CoreError::storage("fetch idempotent run", e)
        })?;

        run_id.ok_or(CoreError::NotFound)
    }

    /// Get a run's status.
    pub async fn get(&self, tenant_id: Uuid, run_id: Uuid) -> Result<RunStatus> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM runs WHERE id = $1 AND tenant_id = $2")
                .bind(run_id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!(run_id = %run_id, tenant_id = %tenant_id, error = %e, "get run failed");
                    CoreError::storage("get run", e)
                })?;

        let status = status.ok_or(CoreError::NotFound)?;
        parse_run_status(&status)
    }

    /// List a run's steps in creation order.
    pub async fn list_steps(&self, tenant_id: Uuid, run_id: Uuid) -> Result<Vec<StepRecord>> {
        self.check_run_ownership(tenant_id, run_id).await?;

        let rows: Vec<(Uuid, String, String)> = sqlx::query_as(
            r#"
            SELECT id, name, status
            FROM steps
            WHERE run_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(run_id = %run_id, error = %e, "list steps query failed");
            CoreError::storage("list steps", e)
        })?;

        Ok(rows
            .into_iter()
            .map(|(id, name, status)| StepRecord { id, name, status })
            .collect())
    }

    /// Aggregate run cost with a per-step breakdown.
    pub async fn cost(&self, tenant_id: Uuid, run_id: Uuid) -> Result<RunCostBreakdown> {
        let total_cost_usd: Option<f64> =
            sqlx::query_scalar("SELECT total_cost_usd FROM runs WHERE id = $1 AND tenant_id = $2")
                .bind(run_id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!(run_id = %run_id, tenant_id = %tenant_id, error = %e, "get run total cost failed");
                    CoreError::storage("get run cost", e)
                })?;
        let total_cost_usd = total_cost_usd.ok_or(CoreError::NotFound)?;

        let rows: Vec<(Uuid, String, String, f64)> = sqlx::query_as(
            r#"
            SELECT id, name, status, cost_usd
            FROM steps
            WHERE run_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(run_id = %run_id, error = %e, "get run step costs failed");
            CoreError::storage("get run step costs", e)
        })?;

        Ok(RunCostBreakdown {
            run_id,
            total_cost_usd,
            steps: rows
                .into_iter()
                .map(|(id, name, status, cost_usd)| StepCostBreakdown {
                    id,
                    name,
                    status,
                    cost_usd,
                })
                .collect(),
        })
    }

    /// Cancel a run and every step of it that has not finished.
    ///
    /// Idempotent: canceling a terminal run is a successful no-op. A step
    /// currently executing on some worker is not preempted; its commit lands
    /// as dead work and the claim predicate skips the run afterwards.
    pub async fn cancel(&self, tenant_id: Uuid, run_id: Uuid) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::storage("begin tx", e))?;

        let status = read_run_status_locked(&mut tx, tenant_id, run_id).await?;
        if status.is_terminal() {
            info!(run_id = %run_id, status = %status, "cancel skipped (terminal)");
            return tx
                .commit()
                .await
                .map_err(|e| CoreError::storage("commit cancel", e));
        }

        sqlx::query("UPDATE runs SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(run_id)
            .bind(RunStatus::Canceled.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(run_id = %run_id, error = %e, "update run cancel failed");
                CoreError::storage("cancel run", e)
            })?;

        sqlx::query(
            r#"
            UPDATE steps
            SET status = $2,
                finished_at = COALESCE(finished_at, NOW())
            WHERE run_id = $1
              AND status IN ($3, $4, $5)
            "#,
        )
        .bind(run_id)
        .bind(StepStatus::Canceled.as_str())
        .bind(StepStatus::Pending.as_str())
        .bind(StepStatus::Running.as_str())
        .bind(StepStatus::WaitingApproval.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(run_id = %run_id, error = %e, "update steps cancel failed");
            CoreError::storage("cancel steps", e)
        })?;

        insert_event(
            &mut tx,
            run_id,
            None,
            event_type::RUN_CANCELED,
            serde_json::json!({"reason": "user_request"}),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| CoreError::storage("commit cancel", e))?;

        metrics::inc_run_status(RunStatus::Canceled.as_str());
        info!(run_id = %run_id, "run canceled");
        Ok(())
    }

    /// Approve a run's waiting APPROVAL step.
    ///
    /// Idempotent: approving a terminal run, or a run with no step in
    /// WAITING_APPROVAL, is a successful no-op. When the approval was the
    /// last open step, the run becomes SUCCEEDED.
    pub async fn approve(&self, tenant_id: Uuid, run_id: Uuid) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::storage("begin tx", e))?;

        let status = read_run_status_locked(&mut tx, tenant_id, run_id).await?;
        if status.is_terminal() {
            info!(run_id = %run_id, status = %status, "approve skipped (terminal)");
            return tx
                .commit()
                .await
                .map_err(|e| CoreError::storage("commit approve", e));
        }

        let approval_step_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE steps
            SET status = $2,
                started_at = COALESCE(started_at, NOW()),
                finished_at = COALESCE(finished_at, NOW())
            WHERE run_id = $1
              AND name = $4
              AND status = $3
            RETURNING id
            "#,
        )
        .bind(run_id)
        .bind(StepStatus::Succeeded.as_str())
        .bind(StepStatus::WaitingApproval.as_str())
        .bind(StepName::Approval.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!(run_id = %run_id, error = %e, "approve step update failed");
            CoreError::storage("approve step", e)
        })?;

        let Some(approval_step_id) = approval_step_id else {
            info!(run_id = %run_id, "approve idempotent");
            return tx
                .commit()
                .await
                .map_err(|e| CoreError::storage("commit approve", e));
        };

        insert_event(
            &mut tx,
            run_id,
            Some(approval_step_id),
            event_type::STEP_APPROVED,
            serde_json::json!({"status": StepStatus::Succeeded.as_str()}),
        )
        .await?;

        insert_event(
            &mut tx,
            run_id,
            None,
            event_type::RUN_APPROVED,
            serde_json::json!({"approved_by": "user"}),
        )
        .await?;

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM steps WHERE run_id = $1 AND status <> $2")
                .bind(run_id)
                .bind(StepStatus::Succeeded.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    error!(run_id = %run_id, error = %e, "count remaining steps failed");
                    CoreError::storage("count remaining steps", e)
                })?;

        let new_status = if remaining == 0 {
            RunStatus::Succeeded
        } else {
            RunStatus::Running
        };

        sqlx::query("UPDATE runs SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(run_id)
            .bind(new_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(run_id = %run_id, error = %e, "update run status failed");
                CoreError::storage("update run status", e)
            })?;

        tx.commit()
            .await
            .map_err(|e| CoreError::storage("commit approve", e))?;

        metrics::inc_step_status(StepStatus::Succeeded.as_str());
        metrics::inc_run_status(new_status.as_str());
        info!(run_id = %run_id, new_status = %new_status, "run approved");
        Ok(())
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
            warn!(run_id = %run_id, "run access denied: not owned");
            return Err(CoreError::NotFound);
        }
        Ok(())
    }
}

async fn read_run_status_locked(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    run_id: Uuid,
) -> Result<RunStatus> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM runs WHERE id = $1 AND tenant_id = $2 FOR UPDATE")
            .bind(run_id)
            .bind(tenant_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| {
                error!(run_id = %run_id, tenant_id = %tenant_id, error = %e, "read run status failed");
                CoreError::storage("read run status", e)
            })?;

    let status = status.ok_or(CoreError::NotFound)?;
    parse_run_status(&status)
}

fn parse_run_status(raw: &str) -> Result<RunStatus> {
    RunStatus::parse(raw).ok_or_else(|| CoreError::Storage {
        operation: "parse run status".to_string(),
        details: format!("unknown run status in database: {}", raw),
    })
}

async fn load_template_steps(
    tx: &mut Transaction<'_, Postgres>,
    template_name: &str,
) -> Result<Vec<TemplateStep>> {
    let rows: Vec<(String, Option<i64>)> = sqlx::query_as(
        r#"
        SELECT wts.name, wts.timeout_seconds
        FROM workflow_templates wt
        JOIN workflow_template_steps wts ON wts.template_id = wt.id
        WHERE wt.name = $1
        ORDER BY wts.position ASC
        "#,
    )
    .bind(template_name)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| {
        error!(template_name, error = %e, "load workflow template failed");
        CoreError::storage("load workflow template", e)
    })?;

    if rows.is_empty() {
        return Err(CoreError::TemplateNotFound {
            template: template_name.to_string(),
        });
    }

    rows.into_iter()
        .map(|(name, timeout_seconds)| {
            let name = StepName::parse(&name).ok_or_else(|| CoreError::Storage {
                operation: "load workflow template".to_string(),
                details: format!("template contains unknown step name: {}", name),
            })?;
            Ok(TemplateStep {
                name,
                timeout_seconds,
            })
        })
        .collect()
}
