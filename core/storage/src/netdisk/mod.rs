//! Netdisk (PCS) storage provider.
//!
//! This module provides a storage backend over the PCS file API with:
//! - Per-request authentication using the acting user's access token
//! - Linear backoff retries with enriched diagnostics on exhaustion
//! - Metadata lookups after reads and moves

pub mod client;
pub mod provider;

pub use client::{HttpPcsTransport, PcsCall, PcsResponse, PcsTransport, PCS_FILE_URL};
pub use provider::{NetdiskConfig, NetdiskProvider};
