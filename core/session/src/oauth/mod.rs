//! OAuth reference session manager.
//!
//! Tokens come from an implicit-grant login: the identity service redirects
//! back with `access_token` in the location fragment, the token is kept in a
//! cookie and validated against the logged-in user endpoint.

pub mod client;
pub mod config;
pub mod session;

pub use client::{PassportClient, UserId, UserInfo, UserInfoClient};
pub use config::OAuthConfig;
pub use session::OAuthSession;
