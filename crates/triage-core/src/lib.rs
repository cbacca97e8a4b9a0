//! # Triage Core
//!
//! Runtime-free logic for embedding-based issue triage: data models,
//! cosine similarity and top-K selection, webhook event normalization,
//! and the provider/tracker/store traits the pipeline is written against.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. The
//! `issue-triage` app crate supplies the SQLite store, the HTTP embedding
//! providers, and the GitHub client.

pub mod embedding;
pub mod event;
pub mod models;
pub mod similarity;
pub mod store;
pub mod tracker;
