//! # Vector Bridge Core
//!
//! Cross-space retrieval logic for Vector Bridge: dimension reconciliation,
//! text quality filtering, embedding providers, space adapters and their
//! trainer, and the query pipeline.
//!
//! This crate contains no tokio runtime, HTTP client, or filesystem I/O.
//! Network collaborators (remote inference, the hosted vector index) and
//! local model backends live in the `vector-bridge` application crate and
//! plug in through the [`embedding::EmbeddingProvider`],
//! [`embedding::LocalEncoder`] and [`index::VectorIndex`] traits.

pub mod adapter;
pub mod embedding;
pub mod error;
pub mod index;
pub mod metadata;
pub mod models;
pub mod prefix;
pub mod retrieve;
pub mod text;
pub mod train;
pub mod vector;

pub use error::{BridgeError, ErrorKind, Result};
