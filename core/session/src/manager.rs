//! Session manager trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fsgate_common::{Result, User};

/// Options for starting a login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginOptions {
    /// Always show the identity service's login form.
    pub force: bool,
    /// How long, in seconds, the obtained token should be remembered.
    pub remember: Option<u64>,
    /// Where the identity service sends the user back to.
    pub redirect_url: Option<String>,
}

/// Why the host is being asked to navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationKind {
    /// Go to the identity service to authorize.
    Authorize,
    /// Reload the current location without the login callback fragment.
    StripCallback,
}

/// A navigation intent handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    pub url: String,
    pub kind: NavigationKind,
}

impl Navigation {
    pub fn authorize(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: NavigationKind::Authorize,
        }
    }

    pub fn strip_callback(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: NavigationKind::StripCallback,
        }
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token known.
    Unauthenticated,
    /// A token is known but no fresh validation backs it.
    TokenCached,
    /// A validation is in flight.
    Validating,
    /// A user validated within the freshness window.
    Authenticated,
    /// The host has been asked to navigate away.
    Redirecting,
}

/// Identity source consulted before every file request.
///
/// The acting user returned by [`check`](SessionManager::check) is attached
/// to the request, and providers authenticate with its token.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Apply implementation-specific configuration.
    async fn init(&self, _config: Value) -> Result<()> {
        Ok(())
    }

    /// Resolve the current user, or None when nobody is signed in.
    ///
    /// # Errors
    /// - [`fsgate_common::Error::Redirecting`] while the host is navigating away
    /// - Validation failures that are not an invalid session
    async fn check(&self) -> Result<Option<User>>;

    /// Start a login and return where the host should navigate.
    async fn login(&self, options: LoginOptions) -> Result<Navigation>;

    /// Sign out, returning the user that was signed in.
    async fn logout(&self) -> Result<Option<User>>;

    /// The last validated user, without any I/O.
    fn current(&self) -> Option<User>;
}
