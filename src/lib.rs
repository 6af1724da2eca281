//! # Wheel Tracker Backend - REST API Server
//!
//! A REST API backend for tracking "wheel" options-trading cycles: sell a
//! cash-secured put, get assigned shares, write covered calls against them,
//! close the cycle. Built with [Axum](https://crates.io/crates/axum) for
//! async HTTP handling and documented via
//! [utoipa](https://crates.io/crates/utoipa).
//!
//! ## Key Features
//!
//! - **Execution ingestion**: raw broker records are normalized into one
//!   canonical shape, deduplicated by execution id, and classified by
//!   instrument kind — re-syncing overlapping time windows is idempotent.
//!
//! - **Wheel state machine**: one authoritative transition table
//!   (`CSP → SHARES_HELD → COVERED_CALL → CLOSED`) rebuilds each symbol's
//!   wheel cycles as a pure fold over its execution history.
//!
//! - **PnL to the cent**: `rust_decimal` arithmetic for premiums,
//!   commissions, realized and unrealized results; money values ship as
//!   `{value, raw, class}` with a sign-derived display hint.
//!
//! - **Trade categorization**: every synced execution gets a suggested
//!   action (start / close / continue wheel, or needs review).
//!
//! - **Analytics**: win rate, monthly buckets, per-symbol rollups and a
//!   close-reason histogram, folded on demand from the wheel set.
//!
//! - **Safe concurrency**: at most one sync in flight per account,
//!   parallel processing across accounts and symbols, and per-symbol
//!   snapshot publication so readers never see a half-applied batch.
//!
//! ## Data Flow
//!
//! ```text
//! broker records → Normalizer → State Machine → PnL Calculator
//!                                     │               │
//!                                     ▼               ▼
//!                              Categorizer      wheel summaries
//!                             (sync report)    / analytics reads
//! ```
//!
//! ## Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Route handlers and router configuration |
//! | [`config`] | TOML configuration loading and validation |
//! | [`db`] | Optional PostgreSQL persistence of the execution log |
//! | [`engine`] | Normalizer, state machine, PnL, categorizer, analytics |
//! | [`error`] | API error types with `IntoResponse` implementation |
//! | [`models`] | Response DTOs with OpenAPI schemas |
//! | [`sources`] | Injected broker/price sources and the simulated broker |
//! | [`state`] | Application state management |
//!
//! ## API Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/v1/stats` | Engine-wide statistics |
//! | GET | `/api/v1/accounts` | Known accounts |
//! | POST | `/api/v1/accounts/{account}/sync` | Ingest new executions |
//! | GET | `/api/v1/accounts/{account}/wheels` | Wheel summaries |
//! | GET | `/api/v1/accounts/{account}/history` | Flat execution history |
//! | GET | `/api/v1/accounts/{account}/analytics` | Aggregate analytics |
//!
//! ## Example Usage
//!
//! ```bash
//! # Development mode (simulated broker)
//! cargo run
//!
//! # With custom host/port and persistence
//! HOST=127.0.0.1 PORT=3000 DATABASE_URL=postgres://... cargo run
//!
//! # Run a sync, then read the wheel summary
//! curl -X POST http://localhost:8080/api/v1/accounts/DEMO/sync
//! curl http://localhost:8080/api/v1/accounts/DEMO/wheels
//! ```
//!
//! Swagger UI is served at `/swagger-ui/` once the server is running.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod sources;
pub mod state;
