// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Observability metrics for the run engine.
//!
//! Metrics are emitted through the `metrics` crate facade; installing an
//! exporter (e.g. `metrics-exporter-prometheus`) is the embedding process's
//! concern. The engine itself holds no recorder state.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `stepline_run_status_total` | Counter | `status` |
//! | `stepline_step_status_total` | Counter | `status` |
//! | `stepline_step_retries_total` | Counter | - |
//! | `stepline_worker_claim_seconds` | Histogram | - |
//! | `stepline_step_execution_seconds` | Histogram | - |
//! | `stepline_webhook_deliveries_total` | Counter | `outcome` |

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: run status transitions.
    pub const RUN_STATUS_TOTAL: &str = "stepline_run_status_total";
    /// Counter: step status transitions.
    pub const STEP_STATUS_TOTAL: &str = "stepline_step_status_total";
    /// Counter: step retries scheduled.
    pub const STEP_RETRIES_TOTAL: &str = "stepline_step_retries_total";
    /// Histogram: claim transaction latency in seconds.
    pub const WORKER_CLAIM_SECONDS: &str = "stepline_worker_claim_seconds";
    /// Histogram: executor wall time in seconds.
    pub const STEP_EXECUTION_SECONDS: &str = "stepline_step_execution_seconds";
    /// Counter: terminal webhook delivery outcomes.
    pub const WEBHOOK_DELIVERIES_TOTAL: &str = "stepline_webhook_deliveries_total";
}

/// Record a run entering the given status.
pub fn inc_run_status(status: &'static str) {
    counter!(names::RUN_STATUS_TOTAL, "status" => status).increment(1);
}

/// Record a step entering the given status.
pub fn inc_step_status(status: &'static str) {
    counter!(names::STEP_STATUS_TOTAL, "status" => status).increment(1);
}

/// Record one scheduled retry.
pub fn inc_step_retries() {
    counter!(names::STEP_RETRIES_TOTAL).increment(1);
}

/// Record the latency of one claim transaction.
pub fn observe_claim_latency(elapsed: Duration) {
    histogram!(names::WORKER_CLAIM_SECONDS).record(elapsed.as_secs_f64());
}

/// Record the wall time of one executor invocation.
pub fn observe_step_execution(elapsed: Duration) {
    histogram!(names::STEP_EXECUTION_SECONDS).record(elapsed.as_secs_f64());
}

/// Record a webhook delivery outcome (`delivered`, `exhausted`, `canceled`).
pub fn inc_webhook_delivery(outcome: &'static str) {
    counter!(names::WEBHOOK_DELIVERIES_TOTAL, "outcome" => outcome).increment(1);
}
