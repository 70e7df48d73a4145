// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stepline Worker - Dedicated Per-Tenant Step Executor
//!
//! A worker is a single cooperative scheduler bound to one tenant. It ticks
//! on a fixed poll interval; each tick claims at most one runnable step with
//! `FOR UPDATE SKIP LOCKED` semantics, executes it under a timeout, and
//! commits the outcome. Horizontal scaling is many worker processes; safety
//! across them relies entirely on row-level lock-and-skip in the claim
//! query, never on in-process coordination.
//!
//! # Execution Cycle
//!
//! ```text
//!  tick ──► claim (tx) ──► execute (timeout) ──► succeed (tx) ──► webhook?
//!              │                  │
//!              │ none             └──► retry-or-fail (tx) ──► webhook?
//!              ▼
//!            return
//! ```
//!
//! # Step State Machine (non-APPROVAL)
//!
//! ```text
//! PENDING ─claim─► RUNNING ─exec ok─► SUCCEEDED
//!                        │
//!                        ├─fail, attempts < max─► PENDING (retry deadline)
//!                        └─fail, attempts = max─► FAILED (run FAILED)
//! ```
//!
//! RUNNING steps whose claim is older than the reclaim window are treated as
//! abandoned and may be claimed again; the reclaim window must be strictly
//! larger than the executor timeout.
//!
//! # Modules
//!
//! - [`executor`]: The `StepExecutor` seam and built-in LLM/TOOL executors
//! - [`webhook`]: At-least-once signed terminal webhook delivery
//! - [`worker`]: Claim core and execution loop

/// Step executor seam and built-in executors.
pub mod executor;

/// Terminal webhook dispatch.
pub mod webhook;

/// Claim core and execution loop.
pub mod worker;
