// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The claim core and execution loop.
//!
//! A worker claims at most one step per tick inside a single short
//! transaction. Eligibility requires, all at once:
//!
//! - step is PENDING, or RUNNING with a claim older than the reclaim window
//! - step is not APPROVAL
//! - the retry deadline, if set, has passed
//! - the owning run is not terminal and belongs to this worker's tenant
//! - every earlier step of the run (by creation order) is SUCCEEDED
//!
//! Selection orders by run priority descending then step creation ascending
//! and locks the chosen row with `FOR UPDATE SKIP LOCKED`, so concurrent
//! workers progress independently without deadlock. Every claim counts as an
//! attempt; the retry-or-fail branch therefore compares against the counter
//! observed after that increment (`max_attempts = 3` permits three
//! executions).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use stepline_core::admission;
use stepline_core::domain::{RunStatus, StepName, StepStatus};
use stepline_core::error::{CoreError, Result};
use stepline_core::events::{event_type, insert_event};
use stepline_core::metrics;

use crate::executor::{default_registry, ExecutorRegistry};
use crate::webhook;

/// Dependencies and tuning for a worker. Non-positive durations and counts
/// select the documented defaults.
pub struct WorkerDeps {
    /// Connection pool shared with the rest of the process.
    pub pool: PgPool,
    /// The tenant this worker is dedicated to.
    pub tenant_id: Uuid,
    /// Age after which a RUNNING step counts as abandoned (default 5 min).
    /// Must be strictly larger than the executor timeout.
    pub reclaim_after: Duration,
    /// Executions permitted per step (default 3).
    pub max_attempts: i32,
    /// Base delay for exponential retry backoff (default 2 s).
    pub retry_base_delay: Duration,
    /// Timeout for steps with no stored timeout (default 30 s).
    pub default_step_timeout: Duration,
}

/// A dedicated per-tenant worker.
pub struct Worker {
    pool: PgPool,
    http_client: reqwest::Client,
    reclaim_after: Duration,
    executors: ExecutorRegistry,
    max_attempts: i32,
    retry_base_delay: Duration,
    default_step_timeout: Duration,
    tenant_id: Uuid,
}

/// Descriptor returned by a successful claim.
#[derive(Debug, Clone)]
pub struct ClaimedStep {
    /// The claimed step.
    pub step_id: Uuid,
    /// Its owning run.
    pub run_id: Uuid,
    /// Step type; never APPROVAL.
    pub name: StepName,
    /// Status observed before the claim; RUNNING means this is a reclaim.
    pub previous_status: StepStatus,
    /// Resolved executor timeout for this step.
    pub timeout: Duration,
}

/// Webhook fields captured by a terminal run transition.
struct TerminalRun {
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    finished_at: DateTime<Utc>,
}

impl Worker {
    /// Build a worker with the built-in executor registry.
    pub fn new(deps: WorkerDeps) -> Self {
        Self::with_registry(deps, default_registry())
    }

    /// Build a worker with a caller-supplied executor registry.
    pub fn with_registry(deps: WorkerDeps, executors: ExecutorRegistry) -> Self {
        let reclaim_after = if deps.reclaim_after.is_zero() {
            Duration::from_secs(5 * 60)
        } else {
            deps.reclaim_after
        };
        let max_attempts = if deps.max_attempts <= 0 {
            3
        } else {
            deps.max_attempts
        };
        let retry_base_delay = if deps.retry_base_delay.is_zero() {
            Duration::from_secs(2)
        } else {
            deps.retry_base_delay
        };
        let default_step_timeout = if deps.default_step_timeout.is_zero() {
            Duration::from_secs(30)
        } else {
            deps.default_step_timeout
        };

        Self {
            pool: deps.pool,
            http_client: webhook::build_client(),
            reclaim_after,
            executors,
            max_attempts,
            retry_base_delay,
            default_step_timeout,
            tenant_id: deps.tenant_id,
        }
    }

    /// Tick loop: claim and process one step per interval until shutdown.
    ///
    /// Errors are logged and never fatal to the loop.
    pub async fn run(
        self: Arc<Self>,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tenant_id = %self.tenant_id,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "worker loop started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(tenant_id = %self.tenant_id, "worker loop stopping");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.process_once(&shutdown).await {
                        error!(error = %e, "worker process failed");
                    }
                }
            }
        }
    }

    /// One full cycle: claim, execute under timeout, commit the outcome.
    /// Returns without error when nothing is claimable.
    pub async fn process_once(&self, shutdown: &watch::Receiver<bool>) -> Result<()> {
        let claim_start = Instant::now();
        let claimed = self.claim_one_step().await;
        metrics::observe_claim_latency(claim_start.elapsed());

        let step = match claimed {
            Ok(Some(step)) => step,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(error = %e, "claim step failed");
                return Err(e);
            }
        };

        info!(
            tenant_id = %self.tenant_id,
            run_id = %step.run_id,
            step_id = %step.step_id,
            step = %step.name,
            prev_status = %step.previous_status,
            timeout_ms = step.timeout.as_millis() as u64,
            "executing step"
        );

        // APPROVAL is excluded by the claim predicate; reaching this branch
        // means the registry or the data is wrong, and retrying won't fix it.
        let Some(executor) = self.executors.get(&step.name).cloned() else {
            error!(
                run_id = %step.run_id,
                step_id = %step.step_id,
                step = %step.name,
                "no executor registered for step"
            );
            return self
                .mark_step_failed(
                    shutdown,
                    step.step_id,
                    &format!("no executor registered for step: {}", step.name),
                    true,
                )
                .await;
        };

        let exec_start = Instant::now();
        let outcome = tokio::time::timeout(step.timeout, executor.execute(step.run_id)).await;
        metrics::observe_step_execution(exec_start.elapsed());

        match outcome {
            Err(_) => {
                error!(
                    run_id = %step.run_id,
                    step_id = %step.step_id,
                    step = %step.name,
                    timeout_ms = step.timeout.as_millis() as u64,
                    timeout_triggered = true,
                    "step execution failed"
                );
                self.mark_step_failed(
                    shutdown,
                    step.step_id,
                    &format!("step execution timed out after {:?}", step.timeout),
                    false,
                )
                .await
            }
            Ok(Err(exec_err)) => {
                error!(
                    run_id = %step.run_id,
                    step_id = %step.step_id,
                    step = %step.name,
                    timeout_triggered = false,
                    error = %exec_err,
                    "step execution failed"
                );
                self.mark_step_failed(shutdown, step.step_id, &exec_err.to_string(), false)
                    .await
            }
            Ok(Ok(output)) => {
                self.mark_step_succeeded(shutdown, &step, output).await
            }
        }
    }

    /// Claim one runnable step, also reclaiming stuck RUNNING steps older
    /// than the reclaim window. Returns `None` when the concurrency gate is
    /// closed or nothing matches.
    async fn claim_one_step(&self) -> Result<Option<ClaimedStep>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::storage("begin tx", e))?;

        let reclaim_before = Utc::now()
            .checked_sub_signed(TimeDelta::from_std(self.reclaim_after).unwrap_or(TimeDelta::MAX))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let stored_limit: Option<i32> =
            sqlx::query_scalar("SELECT max_concurrent_runs FROM tenants WHERE id = $1")
                .bind(self.tenant_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| CoreError::storage("read tenant limits", e))?;
        let Some(stored_limit) = stored_limit else {
            return Err(CoreError::NotFound);
        };
        let max_concurrency = admission::effective_limit(stored_limit);

        let running_steps = admission::running_step_count(&mut tx, self.tenant_id).await?;
        if running_steps >= max_concurrency {
            debug!(
                tenant_id = %self.tenant_id,
                running_steps,
                max_concurrency,
                "claim skipped by concurrency limit"
            );
            return Ok(None);
        }

        let row: Option<(Uuid, Uuid, String, String, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT st.id, st.run_id, st.name, st.status, st.timeout_seconds
            FROM steps st
            JOIN runs r ON st.run_id = r.id
            WHERE (
                st.status = $1 OR
                (st.status = $2 AND st.started_at IS NOT NULL AND st.started_at < $3)
            )
              AND (st.next_run_at IS NULL OR st.next_run_at <= NOW())
              AND st.name <> $4
              AND r.status NOT IN ($5, $6, $7)
              AND r.tenant_id = $9
              AND NOT EXISTS (
                SELECT 1 FROM steps s2
                WHERE s2.run_id = st.run_id
                  AND s2.created_at < st.created_at
                  AND s2.status <> $8
              )
            ORDER BY r.priority DESC, st.created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(StepStatus::Pending.as_str())
        .bind(StepStatus::Running.as_str())
        .bind(reclaim_before)
        .bind(StepName::Approval.as_str())
        .bind(RunStatus::Canceled.as_str())
        .bind(RunStatus::Failed.as_str())
        .bind(RunStatus::Succeeded.as_str())
        .bind(StepStatus::Succeeded.as_str())
        .bind(self.tenant_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CoreError::storage("select claimable step", e))?;

        let Some((step_id, run_id, name_raw, status_raw, timeout_seconds)) = row else {
            return Ok(None);
        };

        // Single defensive parse; anything else is corrupted data.
        let name = StepName::parse(&name_raw).ok_or_else(|| CoreError::Storage {
            operation: "claim step".to_string(),
            details: format!("invalid step name in database: {}", name_raw),
        })?;
        let previous_status = StepStatus::parse(&status_raw).ok_or_else(|| CoreError::Storage {
            operation: "claim step".to_string(),
            details: format!("invalid step status in database: {}", status_raw),
        })?;
        let reclaimed = previous_status == StepStatus::Running;
        let timeout = resolve_step_timeout(timeout_seconds, self.default_step_timeout);
        let claimed_at = Utc::now();

        let input = serde_json::json!({
            "step": name,
            "claimed_at": claimed_at,
            "reclaimed": reclaimed,
        });

        // Every claim counts as an attempt, reclaims included.
        sqlx::query(
            r#"
            UPDATE steps
            SET status = $2,
                started_at = COALESCE(started_at, NOW()),
                input = $3,
                next_run_at = NULL,
                attempts = attempts + 1
            WHERE id = $1
            "#,
        )
        .bind(step_id)
        .bind(StepStatus::Running.as_str())
        .bind(&input)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::storage("mark step running", e))?;

        sqlx::query("UPDATE runs SET current_step = $2, updated_at = NOW() WHERE id = $1")
            .bind(run_id)
            .bind(step_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::storage("track current step", e))?;

        let promoted = sqlx::query("UPDATE runs SET status = $2 WHERE id = $1 AND status = $3")
            .bind(run_id)
            .bind(RunStatus::Running.as_str())
            .bind(RunStatus::Pending.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::storage("promote run", e))?;

        insert_event(
            &mut tx,
            run_id,
            Some(step_id),
            event_type::STEP_CLAIMED,
            serde_json::json!({
                "status": StepStatus::Running.as_str(),
                "step": name,
                "reclaimed": reclaimed,
                "previous": previous_status,
                "tenant_id": self.tenant_id,
                "claimed_at": claimed_at,
            }),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| CoreError::storage("commit claim", e))?;

        if promoted.rows_affected() > 0 {
            metrics::inc_run_status(RunStatus::Running.as_str());
        }

        info!(
            tenant_id = %self.tenant_id,
            run_id = %run_id,
            step_id = %step_id,
            step = %name,
            reclaimed,
            "step marked running"
        );

        Ok(Some(ClaimedStep {
            step_id,
            run_id,
            name,
            previous_status,
            timeout,
        }))
    }

    async fn mark_step_succeeded(
        &self,
        shutdown: &watch::Receiver<bool>,
        step: &ClaimedStep,
        output: crate::executor::ExecutorOutput,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::storage("begin tx", e))?;

        sqlx::query(
            r#"
            UPDATE steps
            SET status = $2,
                output = $3,
                cost_usd = $4,
                next_run_at = NULL,
                finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(step.step_id)
        .bind(StepStatus::Succeeded.as_str())
        .bind(&output.output)
        .bind(output.cost_usd)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::storage("mark step succeeded", e))?;

        sqlx::query("UPDATE runs SET total_cost_usd = total_cost_usd + $2 WHERE id = $1")
            .bind(step.run_id)
            .bind(output.cost_usd)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::storage("aggregate run cost", e))?;

        insert_event(
            &mut tx,
            step.run_id,
            Some(step.step_id),
            event_type::STEP_SUCCEEDED,
            serde_json::json!({
                "status": StepStatus::Succeeded.as_str(),
                "step": step.name,
                "cost": output.cost_usd,
            }),
        )
        .await?;

        // A finished TOOL step parks the run's approval gate.
        if step.name == StepName::Tool {
            let approval_step_id: Option<Uuid> = sqlx::query_scalar(
                r#"
                UPDATE steps
                SET status = $2
                WHERE run_id = $1
                  AND name = $3
                  AND status = $4
                RETURNING id
                "#,
            )
            .bind(step.run_id)
            .bind(StepStatus::WaitingApproval.as_str())
            .bind(StepName::Approval.as_str())
            .bind(StepStatus::Pending.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CoreError::storage("park approval step", e))?;

            if let Some(approval_step_id) = approval_step_id {
                insert_event(
                    &mut tx,
                    step.run_id,
                    Some(approval_step_id),
                    event_type::STEP_WAITING_APPROVAL,
                    serde_json::json!({
                        "status": StepStatus::WaitingApproval.as_str(),
                        "step": StepName::Approval.as_str(),
                    }),
                )
                .await?;
            }
        }

        let terminal: Option<(Option<String>, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            UPDATE runs r
            SET status = $2, updated_at = NOW()
            WHERE r.id = $1
              AND r.status NOT IN ($4, $5, $2)
              AND NOT EXISTS (
                SELECT 1 FROM steps s
                WHERE s.run_id = r.id AND s.status <> $3
              )
            RETURNING r.webhook_url, r.webhook_secret, r.updated_at
            "#,
        )
        .bind(step.run_id)
        .bind(RunStatus::Succeeded.as_str())
        .bind(StepStatus::Succeeded.as_str())
        .bind(RunStatus::Canceled.as_str())
        .bind(RunStatus::Failed.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CoreError::storage("complete run", e))?;

        tx.commit()
            .await
            .map_err(|e| CoreError::storage("commit succeed", e))?;

        metrics::inc_step_status(StepStatus::Succeeded.as_str());
        if let Some((webhook_url, webhook_secret, finished_at)) = terminal {
            metrics::inc_run_status(RunStatus::Succeeded.as_str());
            self.spawn_webhook(
                shutdown,
                step.run_id,
                RunStatus::Succeeded,
                TerminalRun {
                    webhook_url,
                    webhook_secret,
                    finished_at,
                },
            );
        }

        info!(
            tenant_id = %self.tenant_id,
            run_id = %step.run_id,
            step_id = %step.step_id,
            step = %step.name,
            cost_usd = output.cost_usd,
            "step marked succeeded"
        );

        Ok(())
    }

    /// Retry-or-fail: reschedule with an exponential deadline while attempts
    /// remain, otherwise fail the step and (conditionally) the run.
    /// `force_permanent` bypasses the retry branch for unfixable failures.
    async fn mark_step_failed(
        &self,
        shutdown: &watch::Receiver<bool>,
        step_id: Uuid,
        error_message: &str,
        force_permanent: bool,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::storage("begin tx", e))?;

        let row: Option<(i32, Uuid)> =
            sqlx::query_as("SELECT attempts, run_id FROM steps WHERE id = $1")
                .bind(step_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| CoreError::storage("read step attempts", e))?;
        let Some((attempts, run_id)) = row else {
            return Err(CoreError::NotFound);
        };

        let payload = serde_json::json!({"error": error_message});

        if !force_permanent && attempts < self.max_attempts {
            let delay = backoff_delay(self.retry_base_delay, attempts);
            let next_run_at = Utc::now()
                .checked_add_signed(TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);

            warn!(
                step_id = %step_id,
                run_id = %run_id,
                attempt = attempts,
                max_attempts = self.max_attempts,
                next_run_at = %next_run_at,
                "step failed - retrying"
            );

            sqlx::query(
                r#"
                UPDATE steps
                SET status = $2,
                    output = $3,
                    next_run_at = $4,
                    finished_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(step_id)
            .bind(StepStatus::Pending.as_str())
            .bind(&payload)
            .bind(next_run_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::storage("reschedule step", e))?;

            insert_event(
                &mut tx,
                run_id,
                Some(step_id),
                event_type::STEP_FAILED_RETRY,
                serde_json::json!({
                    "status": StepStatus::Pending.as_str(),
                    "error": error_message,
                    "attempt": attempts,
                    "max_attempts": self.max_attempts,
                    "next_run_at": next_run_at,
                }),
            )
            .await?;

            tx.commit()
                .await
                .map_err(|e| CoreError::storage("commit retry", e))?;

            metrics::inc_step_retries();
            info!(
                tenant_id = %self.tenant_id,
                step_id = %step_id,
                run_id = %run_id,
                attempt = attempts,
                next_run_at = %next_run_at,
                "retry scheduled"
            );
            return Ok(());
        }

        error!(
            step_id = %step_id,
            run_id = %run_id,
            attempts,
            max_attempts = self.max_attempts,
            "step permanently failed"
        );

        sqlx::query(
            r#"
            UPDATE steps
            SET status = $2,
                output = $3,
                next_run_at = NULL,
                finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(step_id)
        .bind(StepStatus::Failed.as_str())
        .bind(&payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::storage("mark step failed", e))?;

        insert_event(
            &mut tx,
            run_id,
            Some(step_id),
            event_type::STEP_FAILED,
            serde_json::json!({
                "status": StepStatus::Failed.as_str(),
                "error": error_message,
                "attempt": attempts,
                "max_attempts": self.max_attempts,
            }),
        )
        .await?;

        // Terminal runs stay terminal; a dead-work commit after a cancel
        // must not resurrect the run.
        let terminal: Option<(Option<String>, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            UPDATE runs
            SET status = $2, updated_at = NOW()
            WHERE id = $1
              AND status NOT IN ($2, $3, $4)
            RETURNING webhook_url, webhook_secret, updated_at
            "#,
        )
        .bind(run_id)
        .bind(RunStatus::Failed.as_str())
        .bind(RunStatus::Canceled.as_str())
        .bind(RunStatus::Succeeded.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CoreError::storage("fail run", e))?;

        tx.commit()
            .await
            .map_err(|e| CoreError::storage("commit fail", e))?;

        metrics::inc_step_status(StepStatus::Failed.as_str());
        if let Some((webhook_url, webhook_secret, finished_at)) = terminal {
            metrics::inc_run_status(RunStatus::Failed.as_str());
            self.spawn_webhook(
                shutdown,
                run_id,
                RunStatus::Failed,
                TerminalRun {
                    webhook_url,
                    webhook_secret,
                    finished_at,
                },
            );
        }

        Ok(())
    }

    /// Webhook delivery outlives the triggering transaction; it runs as a
    /// detached task and is bounded by the shutdown signal, not by this tick.
    fn spawn_webhook(
        &self,
        shutdown: &watch::Receiver<bool>,
        run_id: Uuid,
        status: RunStatus,
        terminal: TerminalRun,
    ) {
        let client = self.http_client.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            webhook::deliver_terminal_webhook(
                &client,
                &mut shutdown,
                run_id,
                status,
                terminal.finished_at,
                terminal.webhook_url.as_deref().unwrap_or(""),
                terminal.webhook_secret.as_deref().unwrap_or(""),
            )
            .await;
        });
    }
}

/// `base · 2^attempts`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempts: i32) -> Duration {
    let base = if base.is_zero() {
        Duration::from_secs(2)
    } else {
        base
    };
    if attempts <= 0 {
        return base;
    }

    let mut delay = base;
    for _ in 0..attempts {
        delay = match delay.checked_mul(2) {
            Some(next) => next,
            None => return Duration::MAX,
        };
    }
    delay
}

/// The stored per-step timeout when positive, otherwise the worker default.
fn resolve_step_timeout(timeout_seconds: Option<i64>, default_timeout: Duration) -> Duration {
    match timeout_seconds {
        Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
        _ => {
            if default_timeout.is_zero() {
                Duration::from_secs(30)
            } else {
                default_timeout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles_per_attempt() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_delay_defaults_zero_base() {
        assert_eq!(backoff_delay(Duration::ZERO, 1), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_delay_saturates() {
        let delay = backoff_delay(Duration::from_secs(1), 1000);
        assert_eq!(delay, Duration::MAX);
    }

    #[test]
    fn test_resolve_step_timeout() {
        let default = Duration::from_secs(30);
        assert_eq!(
            resolve_step_timeout(Some(10), default),
            Duration::from_secs(10)
        );
        assert_eq!(resolve_step_timeout(Some(0), default), default);
        assert_eq!(resolve_step_timeout(Some(-5), default), default);
        assert_eq!(resolve_step_timeout(None, default), default);
        assert_eq!(
            resolve_step_timeout(None, Duration::ZERO),
            Duration::from_secs(30)
        );
    }

    #[tokio::test]
    async fn test_worker_deps_defaults_applied() {
        // Pool construction is lazy; connect_lazy never touches the network.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/stepline_test")
            .unwrap();
        let worker = Worker::new(WorkerDeps {
            pool,
            tenant_id: Uuid::new_v4(),
            reclaim_after: Duration::ZERO,
            max_attempts: 0,
            retry_base_delay: Duration::ZERO,
            default_step_timeout: Duration::ZERO,
        });
        assert_eq!(worker.reclaim_after, Duration::from_secs(300));
        assert_eq!(worker.max_attempts, 3);
        assert_eq!(worker.retry_base_delay, Duration::from_secs(2));
        assert_eq!(worker.default_step_timeout, Duration::from_secs(30));
    }
}
