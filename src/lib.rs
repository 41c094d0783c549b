//! # Vector Bridge
//!
//! Query a vector index that was built with a large embedding model, using
//! either that model through a hosted inference API or a small local model
//! whose vectors are projected into the index's space by a trained linear
//! adapter.
//!
//! ## Architecture
//!
//! ```text
//!   query ──▶ normalize ──▶ ┌──────────────────┐ ──▶ reconcile ──▶ ┌─────────┐
//!                           │ EmbeddingProvider │                   │  Index  │
//!                           │ remote | adapted  │                   │  query  │
//!                           │ local  | local     │                   └────┬────┘
//!                           └──────────────────┘                        │
//!                       ranked passages ◀── sort ◀── min score ◀── noise filter
//! ```
//!
//! The pure pipeline (dimension reconciliation, text filtering, the space
//! adapter, training and retrieval) lives in [`vector_bridge_core`]. This
//! crate supplies the I/O around it: configuration, the HTTP index client,
//! the embedding backends, adapter persistence and the `vbr` commands.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults and validation |
//! | [`context`] | Lazily initialized index, adapter and provider |
//! | [`embedding`] | Remote provider and local encoders |
//! | [`pinecone`] | HTTP vector index client |
//! | [`adapter_store`] | Load and save adapter artifacts |
//! | [`search`] | `vbr search` |
//! | [`inspect`] | `vbr stats`, `vbr inspect` |
//! | [`adapter_cmd`] | `vbr adapter train`, `vbr adapter eval` |

pub mod adapter_cmd;
pub mod adapter_store;
pub mod config;
pub mod context;
pub mod embedding;
pub mod inspect;
pub mod pinecone;
pub mod search;
