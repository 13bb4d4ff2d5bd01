#![doc = "artifact-sync-core: core pipeline library for artifact-sync."]

//! Fetches model artifacts from an ordered list of mirrors, strips them down to the
//! files that matter, and publishes them to an archival bucket.
//!
//! # Layout
//! - [`contract`]: data model and the backend, target and progress traits.
//! - [`fetch`]: fallback fetching into canonical local directories.
//! - [`normalize`]: extension allow-list filtering of a fetched tree.
//! - [`publish`] and [`retry`]: delete-then-upload with bounded linear backoff.
//! - [`uploader`] and [`target`]: chunked streaming `PUT` to an HTTP bucket.
//! - [`backends`]: hub and ModelScope style source backends.
//! - [`synchronise`]: the orchestrator tying the phases together.
//! - [`config`]: static YAML-backed configuration.

pub mod backends;
pub mod config;
pub mod contract;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod progress;
pub mod publish;
pub mod retry;
pub mod synchronise;
pub mod target;
pub mod uploader;

pub use contract::{ArtifactSpec, BackendKind, BackendRef, Credential, LocalArtifact};
pub use error::{FetchError, PublishError, SyncError, TransferError};
pub use synchronise::{SyncOptions, SyncOrchestrator, SyncReport};
