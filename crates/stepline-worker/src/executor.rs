// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The step executor seam.
//!
//! The scheduler only sees this capability: given a run, produce output
//! bytes and a cost, or fail. Timeouts are applied by the worker around the
//! call; an executor that overruns its deadline is indistinguishable from
//! any other failure. APPROVAL has no executor by construction.
//!
//! The built-in executors are simulators kept from the reference deployment;
//! production embedders register their own implementations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use stepline_core::domain::StepName;

/// What an executor produced for one step.
#[derive(Debug, Clone)]
pub struct ExecutorOutput {
    /// Opaque JSON stored as the step's output snapshot.
    pub output: serde_json::Value,
    /// Cost attributed to the step, aggregated onto the run.
    pub cost_usd: f64,
}

/// Capability for executing one typed step.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute the step for the given run.
    async fn execute(&self, run_id: Uuid) -> anyhow::Result<ExecutorOutput>;
}

/// Executor registry keyed by step name.
pub type ExecutorRegistry = HashMap<StepName, Arc<dyn StepExecutor>>;

/// The default registry: simulated LLM and TOOL executors, nothing for
/// APPROVAL.
pub fn default_registry() -> ExecutorRegistry {
    let mut registry: ExecutorRegistry = HashMap::new();
    registry.insert(StepName::Llm, Arc::new(LlmExecutor));
    registry.insert(StepName::Tool, Arc::new(ToolExecutor));
    registry
}

const LLM_MODEL_PRICE_PER_TOKEN: f64 = 0.000002;
const LLM_PROMPT_TOKENS: u32 = 180;
const LLM_COMPLETION_TOKENS: u32 = 72;

/// Simulated model call: fixed latency, token-based cost.
pub struct LlmExecutor;

#[async_trait]
impl StepExecutor for LlmExecutor {
    async fn execute(&self, _run_id: Uuid) -> anyhow::Result<ExecutorOutput> {
        tokio::time::sleep(Duration::from_secs(2)).await;

        let total_tokens = LLM_PROMPT_TOKENS + LLM_COMPLETION_TOKENS;
        let cost_usd = f64::from(total_tokens) * LLM_MODEL_PRICE_PER_TOKEN;

        Ok(ExecutorOutput {
            output: json!({
                "type": "llm",
                "text": "hello from llm step",
            }),
            cost_usd,
        })
    }
}

/// Simulated tool call: fixed latency, no cost.
pub struct ToolExecutor;

#[async_trait]
impl StepExecutor for ToolExecutor {
    async fn execute(&self, _run_id: Uuid) -> anyhow::Result<ExecutorOutput> {
        tokio::time::sleep(Duration::from_secs(2)).await;

        Ok(ExecutorOutput {
            output: json!({
                "type": "tool",
                "text": "mock tool ok",
            }),
            cost_usd: 0.0,
        })
    }
}
