//! # framefind core
//!
//! Runtime-agnostic retrieval logic for framefind: the data model, the
//! fuzzy matcher used in fallback mode, temporal alignment of speech hits to
//! frames, catalog path resolution, the per-modality search client with its
//! primary-then-backup decision, the cross-modality and publish-date filters,
//! and result fusion.
//!
//! This crate performs no network or filesystem I/O. Stores, backup corpora
//! and catalogs are reached through the traits in [`store`]; the application
//! crate provides the Elasticsearch, file-backed, and HTTP implementations.

pub mod align;
pub mod filter;
pub mod fusion;
pub mod fuzzy;
pub mod models;
pub mod resolve;
pub mod search;
pub mod store;
