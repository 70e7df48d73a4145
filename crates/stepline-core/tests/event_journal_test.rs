// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the event journal.

mod common;

use common::TestContext;
use uuid::Uuid;

use stepline_core::domain::CreateRunParams;
use stepline_core::events::EventRepository;
use stepline_core::runs::RunRepository;

#[tokio::test]
async fn test_event_sequence_is_monotonic_and_cursorable() {
    skip_if_no_db!();
    let Some(ctx) = TestContext::new().await else {
        eprintln!("Skipping test: failed to create test context");
        return;
    };

    let tenant_id = ctx.create_test_tenant(5).await;
    let runs = RunRepository::new(ctx.pool.clone());
    let events = EventRepository::new(ctx.pool.clone());

    let run_id = runs
        .create(tenant_id, CreateRunParams::default(), None)
        .await
        .expect("create run");

    // Approving a parked run emits STEP_APPROVED then RUN_APPROVED in one
    // transaction.
    ctx.force_step_status(run_id, "APPROVAL", "WAITING_APPROVAL")
        .await;
    ctx.force_run_status(run_id, "RUNNING").await;
    runs.approve(tenant_id, run_id).await.expect("approve");

    let all = events
        .list_after(tenant_id, run_id, 0)
        .await
        .expect("list events");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].event_type, "STEP_APPROVED");
    assert_eq!(all[1].event_type, "RUN_APPROVED");
    assert!(all[0].seq < all[1].seq, "seq must be strictly increasing");

    // Numeric cursor: resuming after the first event yields only the second.
    let tail = events
        .list_after(tenant_id, run_id, all[0].seq)
        .await
        .expect("list tail");
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].event_type, "RUN_APPROVED");

    // UUID cursor resolves to the same position.
    let seq = events
        .resolve_cursor(tenant_id, run_id, all[0].id)
        .await
        .expect("resolve cursor");
    assert_eq!(seq, all[0].seq);
}

#[tokio::test]
async fn test_event_reads_are_tenant_scoped() {
    skip_if_no_db!();
    let Some(ctx) = TestContext::new().await else {
        return;
    };

    let tenant_a = ctx.create_test_tenant(5).await;
    let tenant_b = ctx.create_test_tenant(5).await;
    let runs = RunRepository::new(ctx.pool.clone());
    let events = EventRepository::new(ctx.pool.clone());

    let run_id = runs
        .create(tenant_a, CreateRunParams::default(), None)
        .await
        .expect("create run");
    runs.cancel(tenant_a, run_id).await.expect("cancel");

    let err = events.list_after(tenant_b, run_id, 0).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");

    let owned = events.list_after(tenant_a, run_id, 0).await.expect("owner reads");
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].event_type, "RUN_CANCELED");

    let err = events
        .resolve_cursor(tenant_b, run_id, owned[0].id)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    skip_if_no_db!();
    let Some(ctx) = TestContext::new().await else {
        return;
    };

    let tenant_id = ctx.create_test_tenant(5).await;
    let events = EventRepository::new(ctx.pool.clone());

    let err = events
        .list_after(tenant_id, Uuid::new_v4(), 0)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}
