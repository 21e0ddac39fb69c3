//! Request dispatch for fsgate.
//!
//! The [`Dispatcher`] is the public file API: it resolves the acting user
//! through a session manager, picks a provider from the registry, builds a
//! normalized request from [`FileOptions`] and narrows the provider's
//! response to the shape of the operation.

pub mod dispatcher;
pub mod options;

pub use dispatcher::Dispatcher;
pub use options::FileOptions;
