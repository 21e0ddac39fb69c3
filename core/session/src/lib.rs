//! Session management for fsgate.
//!
//! A [`SessionManager`] answers "who is acting" before every file request.
//! [`AnonymousSession`] is used when nothing else is configured;
//! [`OAuthSession`] is the reference implementation against an implicit-grant
//! OAuth identity service, with cookie-cached tokens and de-duplicated,
//! hedged validation.

pub mod anonymous;
pub mod cookie;
pub mod manager;
pub mod navigator;
pub mod oauth;

pub use anonymous::AnonymousSession;
pub use cookie::{CookieStore, FileCookieStore, MemoryCookieStore};
pub use manager::{LoginOptions, Navigation, NavigationKind, SessionManager, SessionState};
pub use navigator::{MemoryNavigator, Navigator};
pub use oauth::{OAuthConfig, OAuthSession, PassportClient, UserInfo, UserInfoClient};
