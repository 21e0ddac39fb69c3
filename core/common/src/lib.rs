//! Common utilities and types shared across fsgate modules.
//!
//! This module provides the data model every provider and session
//! implementation speaks: paths, files, data payloads, users and ACLs,
//! plus the shared error type and the retry executor used for remote calls.

pub mod error;
pub mod path;
pub mod retry;
pub mod types;

pub use error::{Error, RemoteError, RequestFailure, Result};
pub use path::{resolve, PathInfo};
pub use retry::{Exhausted, RetryConfig, RetryExecutor};
pub use types::{Access, Acl, Content, Data, DataType, File, User};
