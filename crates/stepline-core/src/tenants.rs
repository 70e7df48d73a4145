// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant credentials and per-tenant ceilings.
//!
//! A tenant is an authenticated principal owning runs. Raw bearer tokens are
//! never stored; only their SHA-256 hex digest is persisted, and resolution
//! hashes the presented token and looks up the digest. Revocation is a soft
//! delete via `revoked_at`.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{DEFAULT_MAX_CONCURRENT_RUNS, DEFAULT_MAX_REQUESTS_PER_MIN};
use crate::error::{CoreError, Result};

/// A resolved tenant identity with its effective ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: Uuid,
    /// Concurrent-run ceiling (defaulted when stored value is not positive).
    pub max_concurrent_runs: i32,
    /// Per-minute request ceiling for the rate limiter collaborator.
    pub max_requests_per_min: i32,
}

/// Parameters for creating a tenant.
#[derive(Debug, Clone)]
pub struct CreateTenantParams {
    /// Display name; must be non-blank.
    pub name: String,
    /// Concurrent-run ceiling; non-positive selects the default.
    pub max_concurrent_runs: i32,
    /// Per-minute request ceiling; non-positive selects the default.
    pub max_requests_per_min: i32,
}

/// A freshly created tenant. The token is returned exactly once.
#[derive(Debug, Clone)]
pub struct CreatedTenant {
    /// Tenant identifier.
    pub id: Uuid,
    /// The bearer token. Never persisted; only its hash is stored.
    pub token: String,
}

/// Tenant summary for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Tenant identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Concurrent-run ceiling as stored.
    pub max_concurrent_runs: i32,
    /// Per-minute request ceiling as stored.
    pub max_requests_per_min: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Repository over the `tenants` relation.
#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    /// Create a repository over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve a bearer token to a tenant. Returns `Ok(None)` for unknown or
    /// revoked tokens; ceilings are defaulted when not positive.
    pub async fn resolve(&self, bearer_token: &str) -> Result<Option<Tenant>> {
        if bearer_token.is_empty() {
            return Ok(None);
        }
        let token_hash = sha256_hex(bearer_token);

        let row: Option<(Uuid, i32, i32)> = sqlx::query_as(
            r#"
            SELECT id, max_concurrent_runs, max_requests_per_min
            FROM tenants
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "resolve tenant failed");
            CoreError::storage("resolve tenant", e)
        })?;

        Ok(row.map(|(id, max_concurrent_runs, max_requests_per_min)| Tenant {
            id,
            max_concurrent_runs: if max_concurrent_runs > 0 {
                max_concurrent_runs
            } else {
                DEFAULT_MAX_CONCURRENT_RUNS
            },
            max_requests_per_min: if max_requests_per_min > 0 {
                max_requests_per_min
            } else {
                DEFAULT_MAX_REQUESTS_PER_MIN
            },
        }))
    }

    /// Create a tenant and return its bearer token.
    pub async fn create(&self, params: CreateTenantParams) -> Result<CreatedTenant> {
        let name = params.name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput {
                field: "name".to_string(),
                message: "must not be blank".to_string(),
            });
        }

        let max_concurrent_runs = if params.max_concurrent_runs > 0 {
            params.max_concurrent_runs
        } else {
            DEFAULT_MAX_CONCURRENT_RUNS
        };
        let max_requests_per_min = if params.max_requests_per_min > 0 {
            params.max_requests_per_min
        } else {
            DEFAULT_MAX_REQUESTS_PER_MIN
        };

        let (token, token_hash) = generate_bearer_token();
        let tenant_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, token_hash, max_concurrent_runs, max_requests_per_min)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .bind(&token_hash)
        .bind(max_concurrent_runs)
        .bind(max_requests_per_min)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(name, error = %e, "create tenant failed");
            CoreError::storage("create tenant", e)
        })?;

        info!(tenant_id = %tenant_id, name, "tenant created");
        Ok(CreatedTenant {
            id: tenant_id,
            token,
        })
    }

    /// List unrevoked tenants, newest first.
    pub async fn list(&self) -> Result<Vec<TenantRecord>> {
        let rows: Vec<(Uuid, String, i32, i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, name, max_concurrent_runs, max_requests_per_min, created_at
            FROM tenants
            WHERE revoked_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::storage("list tenants", e))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, name, max_concurrent_runs, max_requests_per_min, created_at)| TenantRecord {
                    id,
                    name,
                    max_concurrent_runs,
                    max_requests_per_min,
                    created_at,
                },
            )
            .collect())
    }

    /// Revoke a tenant. Already-revoked or unknown tenants yield `NotFound`.
    pub async fn revoke(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET revoked_at = NOW()
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(tenant_id = %id, error = %e, "revoke tenant failed");
            CoreError::storage("revoke tenant", e)
        })?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        info!(tenant_id = %id, "tenant revoked");
        Ok(())
    }
}

/// Hex-encoded SHA-256 digest, used for token storage and lookup.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn generate_bearer_token() -> (String, String) {
    let mut raw = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    let token = format!("sk_live_{}", hex::encode(raw));
    let hash = sha256_hex(&token);
    (token, hash)
}
