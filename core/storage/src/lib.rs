//! Storage provider abstraction for fsgate.
//!
//! This module provides the request model every backend consumes, a trait
//! for storage backends (in-memory, netdisk, ...) and a provider registry
//! for dynamic provider resolution.
//!
//! # Design Principles
//! - Provider isolation: backends see only a normalized [`FileRequest`]
//! - Async operations: all I/O operations are async
//! - Unified error semantics: consistent error types across providers

pub mod memory;
pub mod netdisk;
pub mod provider;
pub mod registry;
pub mod request;

pub use memory::MemoryProvider;
pub use netdisk::{NetdiskConfig, NetdiskProvider};
pub use provider::{FileProvider, Response};
pub use registry::ProviderRegistry;
pub use request::{AclMap, DuplicatePolicy, FileRequest, Method};
