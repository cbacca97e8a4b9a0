//! # Issue Triage
//!
//! Embedding-based triage for issue-tracker webhooks. Each qualifying
//! issue event is embedded, scored against previously seen issues by
//! cosine similarity, and linked to its nearest neighbors.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ Webhook  │──▶│ Signature │──▶│    Normalizer    │──▶│ NeighborStrategy │
//! │  (axum)  │   │   HMAC    │   │ (triage-core)    │   │                  │
//! └──────────┘   └───────────┘   └──────────────────┘   └────────┬─────────┘
//!                                                                │
//!                                   ┌────────────────────────────┤
//!                                   ▼                            ▼
//!                           ┌───────────────┐            ┌───────────────┐
//!                           │ Persistent    │            │ Live window   │
//!                           │ SQLite index  │            │ GitHub comment│
//!                           └───────────────┘            └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! triage init                   # create database
//! triage serve                  # start webhook + query server
//! triage suggestion 42          # show the current suggestion for #42
//! triage apply 42               # record that it was applied
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`signature`] | Webhook HMAC verification |
//! | [`embedding`] | Embedding provider implementations |
//! | [`github`] | GitHub REST client |
//! | [`neighbors`] | Persistent-index and live-window strategies |
//! | [`pipeline`] | Delivery handling |
//! | [`suggestions`] | Suggestion query and apply |
//! | [`server`] | HTTP server |
//! | [`sqlite_store`] | SQLite storage backend |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod github;
pub mod migrate;
pub mod neighbors;
pub mod pipeline;
pub mod server;
pub mod signature;
pub mod sqlite_store;
pub mod suggestions;
