// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stepline Core - Durable Workflow Run Engine
//!
//! This crate provides the storage-backed core of the Stepline execution
//! engine. It manages runs, their ordered steps, the append-only event
//! journal, and tenant admission, persisting all state to PostgreSQL so that
//! workflows survive process restarts, worker crashes, and duplicate client
//! requests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         External Clients                                 │
//! │                  (HTTP API, SSE stream, admin CLI)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │    stepline-core      │◄───────────────────│      stepline-worker        │
//! │  (This Crate)         │   claim/commit     │  (dedicated per tenant)     │
//! │  Runs/Steps/Events    │                    │  poll → execute → commit    │
//! └───────────────────────┘                    └─────────────────────────────┘
//!           │
//!           ▼
//! ┌───────────────────────┐
//! │      PostgreSQL       │
//! │  (Durable Storage)    │
//! └───────────────────────┘
//! ```
//!
//! # Run Status State Machine
//!
//! ```text
//!                     ┌─────────┐
//!                     │ PENDING │
//!                     └────┬────┘
//!                          │ first claim
//!                          ▼
//!                     ┌─────────┐
//!          ┌──────────│ RUNNING │──────────┐
//!          │          └────┬────┘          │
//!          │               │               │
//!    cancel│   all steps   │        step permanently
//!          │   SUCCEEDED   │        failed
//!          ▼               ▼               ▼
//!    ┌──────────┐    ┌───────────┐   ┌────────┐
//!    │ CANCELED │    │ SUCCEEDED │   │ FAILED │
//!    └──────────┘    └───────────┘   └────────┘
//! ```
//!
//! A run stays RUNNING while its APPROVAL step sits in WAITING_APPROVAL;
//! approval flips the step to SUCCEEDED and, when it was the last open step,
//! the run to SUCCEEDED. Terminal statuses never transition out.
//!
//! # Ordering and Concurrency
//!
//! | Guarantee | Enforced by |
//! |-----------|-------------|
//! | One run = one `(tenant, idempotency key)` | unique index + in-transaction retry |
//! | Steps execute strictly in creation order | claim predicate (`NOT EXISTS` earlier open step) |
//! | ≤ ceiling non-terminal runs per tenant | tenant row lock at creation ([`admission`]) |
//! | ≤ ceiling RUNNING steps per tenant | claim-time gate ([`admission`]) |
//! | Events per run are causally ordered | `BIGSERIAL seq`, all writes in-transaction |
//!
//! All multi-row invariants are enforced with row locks and conditional
//! updates inside transactions; the engine holds no process-local mutable
//! state.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `STEPLINE_DATABASE_URL` | Yes | - | PostgreSQL connection string |
//! | `STEPLINE_ENV` | No | `dev` | `dev` or `prod`, controls log formatting |
//! | `STEPLINE_AUTO_MIGRATE` | No | `true` | Run schema bootstrap on startup |
//!
//! # Modules
//!
//! - [`admission`]: Per-tenant concurrency ceilings for run creation and step claims
//! - [`config`]: Configuration from environment variables
//! - [`db`]: PostgreSQL pool construction
//! - [`domain`]: Status enums, step names, parameter and breakdown records
//! - [`error`]: Error types with stable error-code mapping
//! - [`events`]: Append-only, globally ordered event journal
//! - [`metrics`]: Counter/histogram helpers on the `metrics` facade
//! - [`runs`]: Transactional run lifecycle (create, cancel, approve, cost)
//! - [`schema`]: Advisory-locked idempotent schema bootstrap
//! - [`tenants`]: Tenant credentials and ceilings

#![deny(missing_docs)]

/// Per-tenant concurrency admission queries.
pub mod admission;

/// Configuration loaded from environment variables.
pub mod config;

/// PostgreSQL pool construction.
pub mod db;

/// Domain model: statuses, step names, parameters, cost breakdowns.
pub mod domain;

/// Error types for core operations with stable error codes.
pub mod error;

/// Append-only event journal.
pub mod events;

/// Metric names and recording helpers.
pub mod metrics;

/// Run lifecycle repository.
pub mod runs;

/// Schema bootstrap and embedded migrations.
pub mod schema;

/// Tenant credential and ceiling repository.
pub mod tenants;
