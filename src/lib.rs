//! # framefind
//!
//! Multi-modal retrieval over a video-frame corpus. One request may carry a
//! visual query (text or image), an on-screen text query, a speech query, and
//! an object-count query; each runs independently and the results come back
//! fused under one key per modality.
//!
//! Text and object modalities query an Elasticsearch-compatible primary
//! store and fall back to a fuzzy-matched backup snapshot when the store is
//! down or has nothing. Speech hits are aligned to the next indexed keyframe.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │ CLI / HTTP   │──▶│  SearchEngine    │──▶│ Elasticsearch │
//! │ (framefind)  │   │  (pipeline)      │   └──────┬───────┘
//! └──────────────┘   └───┬─────────┬───┘          │ unavailable / empty
//!                        │         │              ▼
//!                        ▼         ▼        ┌──────────────┐
//!                  ┌─────────┐ ┌────────┐   │ backup JSON  │
//!                  │ vector  │ │catalogs│   └──────────────┘
//!                  └─────────┘ └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`backup`] | File-backed backup corpora |
//! | [`catalog`] | Media catalogs, frame listing, video metadata |
//! | [`elastic`] | Primary store client |
//! | [`vector`] | Visual-semantic search backends |
//! | [`pipeline`] | Request orchestration and fusion |
//! | [`server`] | HTTP server |

pub mod backup;
pub mod catalog;
pub mod config;
pub mod elastic;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod vector;
