// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model for runs, steps, and costs.
//!
//! Statuses and step names are closed enumerations stored as their wire
//! strings in PostgreSQL. Parsing happens exactly once, at the database
//! boundary; everything above it works with the typed variants.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Applied when a tenant's stored `max_concurrent_runs` is not positive.
pub const DEFAULT_MAX_CONCURRENT_RUNS: i32 = 5;

/// Applied when a tenant's stored `max_requests_per_min` is not positive.
pub const DEFAULT_MAX_REQUESTS_PER_MIN: i32 = 60;

/// Template used when a run is created without an explicit template name.
pub const DEFAULT_WORKFLOW_TEMPLATE_NAME: &str = "default";

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Created, no step claimed yet.
    Pending,
    /// At least one step has been claimed.
    Running,
    /// Reserved: the engine keeps the run RUNNING while its approval step
    /// waits, but the status exists in the domain for API compatibility.
    WaitingApproval,
    /// Every step finished successfully. Terminal.
    Succeeded,
    /// A step exhausted its attempts. Terminal.
    Failed,
    /// Canceled by the owning tenant. Terminal.
    Canceled,
}

impl RunStatus {
    /// The wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::WaitingApproval => "WAITING_APPROVAL",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse a database value. Returns `None` for anything outside the
    /// closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "WAITING_APPROVAL" => Some(Self::WaitingApproval),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Terminal statuses never transition out.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Eligible for claiming (possibly behind a retry deadline).
    Pending,
    /// Claimed by a worker.
    Running,
    /// An APPROVAL step awaiting an external decision.
    WaitingApproval,
    /// Finished successfully. Never changes again.
    Succeeded,
    /// Attempts exhausted. Terminal.
    Failed,
    /// Owning run was canceled. Terminal.
    Canceled,
}

impl StepStatus {
    /// The wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::WaitingApproval => "WAITING_APPROVAL",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse a database value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "WAITING_APPROVAL" => Some(Self::WaitingApproval),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed name of a step. APPROVAL steps are never executed by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepName {
    /// Model call.
    Llm,
    /// Tool call.
    Tool,
    /// Human approval gate; driven externally via the approve operation.
    Approval,
}

impl StepName {
    /// The wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "LLM",
            Self::Tool => "TOOL",
            Self::Approval => "APPROVAL",
        }
    }

    /// Parse a database value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LLM" => Some(Self::Llm),
            "TOOL" => Some(Self::Tool),
            "APPROVAL" => Some(Self::Approval),
            _ => None,
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a run.
#[derive(Debug, Clone, Default)]
pub struct CreateRunParams {
    /// Workflow template to expand; [`DEFAULT_WORKFLOW_TEMPLATE_NAME`] when
    /// empty or absent.
    pub template_name: Option<String>,
    /// Higher priority runs are claimed first.
    pub priority: i32,
    /// Terminal webhook target. Blank is treated as absent.
    pub webhook_url: Option<String>,
}

/// Step summary returned by step listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step identifier.
    pub id: Uuid,
    /// Step name wire string.
    pub name: String,
    /// Step status wire string.
    pub status: String,
}

/// Per-step cost line in a run cost breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCostBreakdown {
    /// Step identifier.
    pub id: Uuid,
    /// Step name wire string.
    pub name: String,
    /// Step status wire string.
    pub status: String,
    /// Cost attributed to this step.
    pub cost_usd: f64,
}

/// Aggregated run cost with a per-step breakdown in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCostBreakdown {
    /// Run identifier.
    pub run_id: Uuid,
    /// Materialized total, kept on the run row for O(1) reads.
    pub total_cost_usd: f64,
    /// Per-step lines ordered by step creation.
    pub steps: Vec<StepCostBreakdown>,
}
