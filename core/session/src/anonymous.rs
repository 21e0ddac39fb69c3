//! Session manager used when no identity source is configured.

use async_trait::async_trait;

use fsgate_common::{Error, Result, User};

use crate::manager::{LoginOptions, Navigation, SessionManager};

/// Nobody is ever signed in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousSession;

#[async_trait]
impl SessionManager for AnonymousSession {
    async fn check(&self) -> Result<Option<User>> {
        Ok(None)
    }

    async fn login(&self, _options: LoginOptions) -> Result<Navigation> {
        Err(Error::NotSupported(
            "No session manager is configured".to_string(),
        ))
    }

    async fn logout(&self) -> Result<Option<User>> {
        Ok(None)
    }

    fn current(&self) -> Option<User> {
        None
    }
}
