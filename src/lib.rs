//! # Mailwise
//!
//! Resumable, cached LLM analysis jobs over large email sets.
//!
//! The crate is the persistence substrate that lets long, chunked analysis
//! jobs survive interruption and avoid paying for the same model call twice.
//! The mail API itself and the model call are external collaborators: the
//! former supplies [`email::EmailRecord`] datasets, the latter plugs in
//! through the [`engine::ChunkProcessor`] trait.
//!
//! ## Modules
//!
//! - `cache` - Disk-backed, TTL-expiring cache of prior model-call results
//! - `checkpoint` - Versioned snapshots of in-progress job state
//! - `chunking` - Pure chunk/group/aggregate helpers for email datasets
//! - `email` - The email dataset record consumed by the helpers and engine
//! - `engine` - Sequential chunk executor with checkpoint/resume support
//! - `error` - Crate-wide error type
//! - `fingerprint` - Dataset and prompt hashing for resume validation
pub mod cache;
pub mod checkpoint;
pub mod chunking;
pub mod email;
pub mod engine;
pub mod error;
pub mod fingerprint;
