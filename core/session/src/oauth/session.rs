//! OAuth session manager with cookie-cached tokens.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use serde_json::Value;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, info, warn};

use fsgate_common::{Error, Result, RetryConfig, User};

use super::client::{PassportClient, UserInfo, UserInfoClient};
use super::config::{seconds, OAuthConfig, SCOPES};
use crate::cookie::CookieStore;
use crate::manager::{LoginOptions, Navigation, SessionManager, SessionState};
use crate::navigator::Navigator;

/// Outcome of the in-flight validation, shared by every waiter.
type PendingCheck = Shared<BoxFuture<'static, Result<Option<User>>>>;

#[derive(Default)]
struct SessionInner {
    user: Option<User>,
    token: Option<String>,
    pending: Option<PendingCheck>,
    /// Set once the host has been asked to navigate away.
    redirect: Option<String>,
    /// Bumped on logout so that a validation started earlier does not
    /// resurrect the session.
    generation: u64,
}

fn lock(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Token delivered in the fragment of a login callback location.
#[derive(Debug, PartialEq)]
struct Callback {
    token: String,
    remember: Option<u64>,
    /// The location without its fragment.
    location: String,
}

fn parse_callback(location: &str) -> Option<Callback> {
    let (base, fragment) = location.split_once('#')?;
    let mut token = None;
    let mut remember = None;

    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => token = Some(value.into_owned()),
            "state" => remember = value.parse().ok(),
            _ => {}
        }
    }

    Some(Callback {
        token: token.filter(|token| !token.is_empty())?,
        remember,
        location: base.to_string(),
    })
}

fn strip_fragment(location: &str) -> &str {
    location
        .split_once('#')
        .map_or(location, |(base, _)| base)
}

fn rearm(timer: Pin<&mut Sleep>, delay: Option<Duration>) -> bool {
    match delay {
        Some(delay) => {
            timer.reset(Instant::now() + delay);
            true
        }
        None => false,
    }
}

/// Look up the user behind `token`, hedging slow attempts.
///
/// The first attempt starts at once. Each delay of `hedge` that elapses
/// without an answer starts another attempt next to the pending ones, and a
/// failed attempt with nothing else pending starts the next one right away.
/// The first answer wins; rejected tokens are an answer too. When every
/// attempt has failed the last error is returned.
async fn hedged_fetch(
    client: &dyn UserInfoClient,
    endpoint: &str,
    token: &str,
    hedge: &RetryConfig,
) -> Result<UserInfo> {
    let mut delays = hedge.schedule().collect::<Vec<_>>().into_iter();
    let mut attempts = FuturesUnordered::new();
    let mut launched = 1u32;
    attempts.push(client.fetch(endpoint, token));

    let first = delays.next();
    let timer = sleep(first.unwrap_or_default());
    tokio::pin!(timer);
    let mut armed = first.is_some();
    let mut last_error = None;

    loop {
        tokio::select! {
            Some(result) = attempts.next() => match result {
                Ok(info) => return Ok(info),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    debug!("Validation attempt failed: {}", e);
                    last_error = Some(e);
                    if attempts.is_empty() {
                        if !armed {
                            break;
                        }
                        launched += 1;
                        debug!("Starting validation attempt {} early", launched);
                        attempts.push(client.fetch(endpoint, token));
                        armed = rearm(timer.as_mut(), delays.next());
                    }
                }
            },
            () = &mut timer, if armed => {
                launched += 1;
                debug!("Validation slow, starting attempt {}", launched);
                attempts.push(client.fetch(endpoint, token));
                armed = rearm(timer.as_mut(), delays.next());
            }
            else => break,
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::Authentication("No validation attempt was made".to_string())))
}

/// Session manager for an implicit-grant OAuth identity service.
///
/// The access token travels from the login callback into a cookie named
/// `<api_key>_ak`. A validated user is trusted for the freshness window;
/// after that the next `check` asks the identity service again, with at most
/// one validation in flight at a time.
pub struct OAuthSession {
    config: RwLock<OAuthConfig>,
    client: Arc<dyn UserInfoClient>,
    cookies: Arc<dyn CookieStore>,
    navigator: Arc<dyn Navigator>,
    inner: Arc<Mutex<SessionInner>>,
}

impl OAuthSession {
    /// Create a session validating tokens over HTTPS.
    pub fn new(
        config: OAuthConfig,
        cookies: Arc<dyn CookieStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        Ok(Self::with_client(
            config,
            Arc::new(PassportClient::new()?),
            cookies,
            navigator,
        ))
    }

    /// Create a session over a custom identity client.
    pub fn with_client(
        config: OAuthConfig,
        client: Arc<dyn UserInfoClient>,
        cookies: Arc<dyn CookieStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            client,
            cookies,
            navigator,
            inner: Arc::new(Mutex::new(SessionInner::default())),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> OAuthConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> SessionState {
        let freshness = self.config().freshness();
        let inner = lock(&self.inner);

        if inner.redirect.is_some() {
            SessionState::Redirecting
        } else if inner.pending.is_some() {
            SessionState::Validating
        } else if inner
            .user
            .as_ref()
            .is_some_and(|user| Utc::now() - user.validated_at < freshness)
        {
            SessionState::Authenticated
        } else if inner.token.is_some() {
            SessionState::TokenCached
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Build the authorize URL for a login.
    fn authorize_url(
        config: &OAuthConfig,
        redirect: &str,
        force: bool,
        remember: u64,
    ) -> Result<String> {
        let client = BasicClient::new(ClientId::new(config.api_key.clone()))
            .set_auth_uri(
                AuthUrl::new(config.authorize_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid authorize URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect.to_string())
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
            );

        // The state parameter round-trips the token lifetime to the callback.
        let mut request = client
            .authorize_url(|| CsrfToken::new(remember.to_string()))
            .use_implicit_flow();
        for scope in SCOPES {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, _) = request
            .add_extra_param("display", "page")
            .add_extra_param("force_login", if force { "1" } else { "0" })
            .url();

        Ok(url.to_string())
    }

    /// Persist the token from a login callback and ask the host to reload
    /// without the fragment. Returns the reload location.
    fn accept_callback(
        &self,
        inner: &mut SessionInner,
        config: &OAuthConfig,
        callback: Callback,
    ) -> Result<String> {
        let remember = callback.remember.unwrap_or(config.default_remember_secs);
        self.cookies
            .write(&config.cookie_name(), &callback.token, seconds(remember))?;
        info!("Captured login callback, token kept for {}s", remember);

        let navigation = Navigation::strip_callback(callback.location);
        self.navigator.navigate(&navigation)?;

        inner.token = Some(callback.token);
        inner.redirect = Some(navigation.url.clone());
        Ok(navigation.url)
    }

    /// Start validating `token` on a task of its own and register it as the
    /// in-flight validation.
    ///
    /// The task runs to completion even when every waiter gives up.
    fn spawn_validation(
        &self,
        inner: &mut SessionInner,
        token: String,
        config: OAuthConfig,
    ) -> PendingCheck {
        let client = Arc::clone(&self.client);
        let cookies = Arc::clone(&self.cookies);
        let state = Arc::clone(&self.inner);
        let generation = inner.generation;
        debug!("Validating session token");

        let task = tokio::spawn(async move {
            let result =
                hedged_fetch(client.as_ref(), &config.user_info_url, &token, &config.hedge()).await;

            let mut inner = lock(&state);
            if inner.generation != generation {
                debug!("Session changed during validation, discarding result");
                return Ok(None);
            }
            inner.pending = None;

            match result {
                Ok(info) => {
                    let user = info.into_user(&token, &config);
                    info!("Signed in as {}", user.username);
                    inner.user = Some(user.clone());
                    Ok(Some(user))
                }
                Err(Error::InvalidSession(reason)) => {
                    warn!("Session token rejected: {}", reason);
                    inner.user = None;
                    inner.token = None;
                    drop(inner);
                    if let Err(e) = cookies.clear(&config.cookie_name()) {
                        warn!("Failed to clear session cookie: {}", e);
                    }
                    Ok(None)
                }
                Err(e) => {
                    warn!("Session validation failed: {}", e);
                    Err(e)
                }
            }
        });

        let pending = async move {
            task.await
                .map_err(|e| Error::Authentication(format!("Session validation task failed: {}", e)))?
        }
        .boxed()
        .shared();

        inner.pending = Some(pending.clone());
        pending
    }
}

#[async_trait]
impl SessionManager for OAuthSession {
    async fn init(&self, config: Value) -> Result<()> {
        let merged = self.config().merged(config)?;
        debug!("OAuth session configured for key {}", merged.api_key);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = merged;
        Ok(())
    }

    async fn check(&self) -> Result<Option<User>> {
        let pending = {
            let config = self.config();
            let mut inner = lock(&self.inner);

            if let Some(url) = &inner.redirect {
                return Err(Error::Redirecting(url.clone()));
            }

            if let Some(user) = inner
                .user
                .as_ref()
                .filter(|user| Utc::now() - user.validated_at < config.freshness())
            {
                return Ok(Some(user.clone()));
            }

            match inner.pending.clone() {
                Some(pending) => {
                    debug!("Joining in-flight session validation");
                    pending
                }
                None => {
                    let callback = self
                        .navigator
                        .current_location()
                        .as_deref()
                        .and_then(parse_callback);
                    if let Some(callback) = callback {
                        let url = self.accept_callback(&mut inner, &config, callback)?;
                        return Err(Error::Redirecting(url));
                    }

                    let Some(token) = self.cookies.read(&config.cookie_name())? else {
                        inner.user = None;
                        inner.token = None;
                        return Ok(None);
                    };
                    inner.token = Some(token.clone());
                    self.spawn_validation(&mut inner, token, config)
                }
            }
        };

        pending.await
    }

    async fn login(&self, options: LoginOptions) -> Result<Navigation> {
        let config = self.config();
        if config.api_key.is_empty() {
            return Err(Error::InvalidInput(
                "OAuth api key is not configured".to_string(),
            ));
        }

        let redirect = options
            .redirect_url
            .or_else(|| config.redirect_url.clone())
            .or_else(|| {
                self.navigator
                    .current_location()
                    .map(|location| strip_fragment(&location).to_string())
            })
            .ok_or_else(|| Error::InvalidInput("No redirect URL for login".to_string()))?;
        let remember = options.remember.unwrap_or(config.default_remember_secs);

        let navigation =
            Navigation::authorize(Self::authorize_url(&config, &redirect, options.force, remember)?);
        self.navigator.navigate(&navigation)?;
        info!("Redirecting to the identity service for login");

        lock(&self.inner).redirect = Some(navigation.url.clone());
        Ok(navigation)
    }

    async fn logout(&self) -> Result<Option<User>> {
        let config = self.config();
        let previous = {
            let mut inner = lock(&self.inner);
            inner.generation += 1;
            inner.pending = None;
            inner.redirect = None;
            inner.token = None;
            inner.user.take()
        };

        self.cookies.clear(&config.cookie_name())?;
        if let Some(user) = &previous {
            info!("Signed out {}", user.username);
        }
        Ok(previous)
    }

    fn current(&self) -> Option<User> {
        lock(&self.inner).user.clone()
    }
}
