// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for stepline-worker tests.
//!
//! Provides a database-backed context (skipped without `TEST_DATABASE_URL`),
//! deterministic fake executors, and a local webhook receiver.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use stepline_core::domain::{CreateRunParams, StepName};
use stepline_core::runs::RunRepository;
use stepline_worker::executor::{ExecutorOutput, ExecutorRegistry, StepExecutor};

/// Test context holding a database pool with the schema applied.
pub struct TestContext {
    pub pool: PgPool,
}

impl TestContext {
    /// Connect to `TEST_DATABASE_URL` and run the schema bootstrap.
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
        .bind(format!("worker-test-{}", tenant_id))
        .bind(format!("hash-{}", tenant_id))
        .bind(max_concurrent_runs)
        .execute(&self.pool)
        .await
        .expect("Failed to create test tenant");
        tenant_id
    }

    /// Create a run through the repository, expanding the default template.
    pub async fn create_run(&self, tenant_id: Uuid, priority: i32) -> Uuid {
        RunRepository::new(self.pool.clone())
            .create(
                tenant_id,
                CreateRunParams {
                    priority,
                    ..Default::default()
                },
                None,
            )
            .await
            .expect("Failed to create run")
    }

    pub async fn run_status(&self, run_id: Uuid) -> String {
        sqlx::query_scalar("SELECT status FROM runs WHERE id = $1")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read run status")
    }

    pub async fn run_total_cost(&self, run_id: Uuid) -> f64 {
        sqlx::query_scalar("SELECT total_cost_usd FROM runs WHERE id = $1")
            .bind(run_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read run cost")
    }

    /// `(name, status, attempts)` rows in creation order.
    pub async fn step_rows(&self, run_id: Uuid) -> Vec<(String, String, i32)> {
        sqlx::query_as(
            "SELECT name, status, attempts FROM steps WHERE run_id = $1 ORDER BY created_at ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .expect("Failed to read steps")
    }

    /// `(type, payload)` event rows in sequence order.
    pub async fn event_rows(&self, run_id: Uuid) -> Vec<(String, serde_json::Value)> {
        sqlx::query_as(
            "SELECT type, COALESCE(payload, 'null'::jsonb) FROM events WHERE run_id = $1 ORDER BY seq ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .expect("Failed to read events")
    }

    pub async fn force_step_status(&self, run_id: Uuid, name: &str, status: &str) {
        sqlx::query("UPDATE steps SET status = $3 WHERE run_id = $1 AND name = $2")
            .bind(run_id)
            .bind(name)
            .bind(status)
            .execute(&self.pool)
            .await
            .expect("Failed to force step status");
    }

    pub async fn force_run_status(&self, run_id: Uuid, status: &str) {
        sqlx::query("UPDATE runs SET status = $2 WHERE id = $1")
            .bind(run_id)
            .bind(status)
            .execute(&self.pool)
            .await
            .expect("Failed to force run status");
    }

    /// Make a step immediately claimable again by expiring its retry deadline.
    pub async fn expire_retry_deadline(&self, run_id: Uuid, name: &str) {
        sqlx::query(
            "UPDATE steps SET next_run_at = NOW() - INTERVAL '1 second' WHERE run_id = $1 AND name = $2",
        )
        .bind(run_id)
        .bind(name)
        .execute(&self.pool)
        .await
        .expect("Failed to expire retry deadline");
    }

    /// Retry deadline of a step, if any.
    pub async fn retry_deadline(
        &self,
        run_id: Uuid,
        name: &str,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        sqlx::query_scalar("SELECT next_run_at FROM steps WHERE run_id = $1 AND name = $2")
            .bind(run_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read retry deadline")
    }

    /// Configure the webhook target and secret on a run.
    pub async fn set_webhook(&self, run_id: Uuid, url: &str, secret: Option<&str>) {
        sqlx::query("UPDATE runs SET webhook_url = $2, webhook_secret = $3 WHERE id = $1")
            .bind(run_id)
            .bind(url)
            .bind(secret)
            .execute(&self.pool)
            .await
            .expect("Failed to set webhook");
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

// ============================================================================
// Fake Executors
// ============================================================================

/// Executor that succeeds instantly with a fixed output and cost.
pub struct StaticExecutor {
    pub output: serde_json::Value,
    pub cost_usd: f64,
}

#[async_trait]
impl StepExecutor for StaticExecutor {
    async fn execute(&self, _run_id: Uuid) -> anyhow::Result<ExecutorOutput> {
        Ok(ExecutorOutput {
            output: self.output.clone(),
            cost_usd: self.cost_usd,
        })
    }
}

/// Executor that always fails.
pub struct FailingExecutor;

#[async_trait]
impl StepExecutor for FailingExecutor {
    async fn execute(&self, _run_id: Uuid) -> anyhow::Result<ExecutorOutput> {
        anyhow::bail!("synthetic executor failure")
    }
}

/// Executor that sleeps longer than any sane step timeout.
pub struct SlowExecutor {
    pub duration: Duration,
}

#[async_trait]
impl StepExecutor for SlowExecutor {
    async fn execute(&self, _run_id: Uuid) -> anyhow::Result<ExecutorOutput> {
        tokio::time::sleep(self.duration).await;
        Ok(ExecutorOutput {
            output: serde_json::json!({"type": "slow"}),
            cost_usd: 0.0,
        })
    }
}

/// Registry with instant LLM and TOOL executors.
pub fn instant_registry(llm_cost: f64) -> ExecutorRegistry {
    let mut registry: ExecutorRegistry = Default::default();
    registry.insert(
        StepName::Llm,
        Arc::new(StaticExecutor {
            output: serde_json::json!({"type": "llm", "text": "ok"}),
            cost_usd: llm_cost,
        }),
    );
    registry.insert(
        StepName::Tool,
        Arc::new(StaticExecutor {
            output: serde_json::json!({"type": "tool", "text": "ok"}),
            cost_usd: 0.0,
        }),
    );
    registry
}

/// Registry whose LLM executor always fails; TOOL succeeds instantly.
pub fn failing_llm_registry() -> ExecutorRegistry {
    let mut registry = instant_registry(0.0);
    registry.insert(StepName::Llm, Arc::new(FailingExecutor));
    registry
}

// ============================================================================
// Webhook Receiver
// ============================================================================

/// One request captured by the webhook receiver.
#[derive(Debug, Clone)]
pub struct ReceivedWebhook {
    pub signature: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
struct ReceiverState {
    /// HTTP statuses to answer with, consumed in order; the last one repeats.
    statuses: Arc<Vec<u16>>,
    hits: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<ReceivedWebhook>,
}

/// A local HTTP endpoint that records webhook deliveries.
pub struct WebhookReceiver {
    pub url: String,
    pub rx: mpsc::UnboundedReceiver<ReceivedWebhook>,
    hits: Arc<AtomicUsize>,
}

impl WebhookReceiver {
    /// Start a receiver answering with the given status sequence
    /// (the last status repeats for any further requests).
    pub async fn start(statuses: Vec<u16>) -> Self {
        assert!(!statuses.is_empty());
        let (tx, rx) = mpsc::unbounded_channel();
        let hits = Arc::new(AtomicUsize::new(0));
        let state = ReceiverState {
            statuses: Arc::new(statuses),
            hits: hits.clone(),
            tx,
        };

        let app = Router::new()
            .route("/hook", post(receive))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind webhook receiver");
        let addr: SocketAddr = listener.local_addr().expect("receiver addr");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test webhook receiver error: {}", e);
            }
        });

        Self {
            url: format!("http://{}/hook", addr),
            rx,
            hits,
        }
    }

    /// Total requests answered so far.
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Wait for the next delivery, failing the test after `timeout`.
    pub async fn next_delivery(&mut self, timeout: Duration) -> ReceivedWebhook {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .expect("timed out waiting for webhook delivery")
            .expect("webhook receiver channel closed")
    }
}

async fn receive(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);
    let _ = state.tx.send(ReceivedWebhook {
        signature: headers
            .get("X-Signature")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        content_type: headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    });

    let status = *state
        .statuses
        .get(hit)
        .unwrap_or_else(|| state.statuses.last().expect("non-empty statuses"));
    StatusCode::from_u16(status).expect("valid status code")
}
