// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for tenant credentials.

mod common;

use common::TestContext;
use uuid::Uuid;

use stepline_core::tenants::{CreateTenantParams, TenantRepository};

#[tokio::test]
async fn test_create_resolve_revoke_round_trip() {
    skip_if_no_db!();
    let Some(ctx) = TestContext::new().await else {
        eprintln!("Skipping test: failed to create test context");
        return;
    };

    let repo = TenantRepository::new(ctx.pool.clone());
    let created = repo
        .create(CreateTenantParams {
            name: format!("acme-{}", Uuid::new_v4()),
            max_concurrent_runs: 7,
            max_requests_per_min: 0,
        })
        .await
        .expect("create tenant");
    assert!(created.token.starts_with("sk_live_"));

    let resolved = repo
        .resolve(&created.token)
        .await
        .expect("resolve")
        .expect("token must resolve");
    assert_eq!(resolved.id, created.id);
    assert_eq!(resolved.max_concurrent_runs, 7);
    // Non-positive stored ceiling falls back to the default.
    assert_eq!(resolved.max_requests_per_min, 60);

    repo.revoke(created.id).await.expect("revoke");
    assert!(repo.resolve(&created.token).await.expect("resolve").is_none());

    // Revoking twice is not-found.
    let err = repo.revoke(created.id).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_resolve_unknown_token() {
    skip_if_no_db!();
    let Some(ctx) = TestContext::new().await else {
        return;
    };

    let repo = TenantRepository::new(ctx.pool.clone());
    assert!(repo.resolve("sk_live_bogus").await.expect("resolve").is_none());
    assert!(repo.resolve("").await.expect("resolve").is_none());
}

#[tokio::test]
async fn test_create_rejects_blank_name() {
    skip_if_no_db!();
    let Some(ctx) = TestContext::new().await else {
        return;
    };

    let repo = TenantRepository::new(ctx.pool.clone());
    let err = repo
        .create(CreateTenantParams {
            name: "   ".to_string(),
            max_concurrent_runs: 0,
            max_requests_per_min: 0,
        })
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_INPUT");
}
