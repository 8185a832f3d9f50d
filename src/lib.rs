//! Battlegrounds post-match stats backend.
//!
//! Ingests finished matches into per-run stats and a per-user best stat
//! ledger, and serves the stored run stats back.

pub mod api;
pub mod codec;
pub mod collaborators;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod retrieval;
pub mod stats;
pub mod store;
