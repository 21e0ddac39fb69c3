//! OAuth session configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use fsgate_common::{Error, Result, RetryConfig};

/// Implicit-grant authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://openapi.baidu.com/oauth/2.0/authorize";
/// Logged-in user lookup endpoint.
pub const USER_INFO_URL: &str =
    "https://openapi.baidu.com/rest/2.0/passport/users/getLoggedInUser";
/// Avatar URL prefixes, followed by the portrait id.
pub const SMALL_PORTRAIT_URL: &str = "http://tb.himg.baidu.com/sys/portraitn/item/";
pub const LARGE_PORTRAIT_URL: &str = "http://tb.himg.baidu.com/sys/portrait/item/";

/// Scopes requested at login.
pub const SCOPES: [&str; 2] = ["basic", "netdisk"];

/// Configuration for [`super::OAuthSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OAuthConfig {
    /// Application key; also names the token cookie.
    pub api_key: String,
    pub authorize_url: String,
    pub user_info_url: String,
    /// Redirect target after authorization. Falls back to the current location.
    pub redirect_url: Option<String>,
    /// How long a validated user is trusted without asking again.
    pub freshness_secs: u64,
    /// Extra validation attempts launched while earlier ones are pending.
    pub hedge_attempts: u32,
    /// The n-th extra attempt is launched n times this after the previous one.
    pub hedge_step_ms: u64,
    /// Token lifetime when a login does not say otherwise.
    pub default_remember_secs: u64,
    pub small_portrait_url: String,
    pub large_portrait_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            authorize_url: AUTHORIZE_URL.to_string(),
            user_info_url: USER_INFO_URL.to_string(),
            redirect_url: None,
            freshness_secs: 3600,
            hedge_attempts: 3,
            hedge_step_ms: 1000,
            default_remember_secs: 60,
            small_portrait_url: SMALL_PORTRAIT_URL.to_string(),
            large_portrait_url: LARGE_PORTRAIT_URL.to_string(),
        }
    }
}

impl OAuthConfig {
    /// Configuration for an application key with everything else defaulted.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Name of the cookie holding the access token.
    pub fn cookie_name(&self) -> String {
        format!("{}_ak", self.api_key)
    }

    pub fn freshness(&self) -> chrono::Duration {
        seconds(self.freshness_secs)
    }

    /// Schedule of hedged validation attempts.
    pub fn hedge(&self) -> RetryConfig {
        RetryConfig::new(self.hedge_attempts)
            .with_delay_step(Duration::from_millis(self.hedge_step_ms))
    }

    /// Overlay the keys present in `patch` onto this configuration.
    ///
    /// Null values leave the current setting untouched.
    pub fn merged(&self, patch: Value) -> Result<Self> {
        let mut merged = serde_json::to_value(self)?;
        match (patch, &mut merged) {
            (Value::Null, _) => {}
            (Value::Object(patch), Value::Object(base)) => {
                for (key, value) in patch {
                    if !value.is_null() {
                        base.insert(key, value);
                    }
                }
            }
            (other, _) => {
                return Err(Error::InvalidInput(format!(
                    "OAuth config must be an object, got {}",
                    other
                )));
            }
        }
        serde_json::from_value(merged)
            .map_err(|e| Error::InvalidInput(format!("Invalid OAuth config: {}", e)))
    }
}

/// Whole seconds as a chrono duration, saturating.
pub(crate) fn seconds(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    chrono::Duration::seconds(secs.min(i64::MAX / 1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = OAuthConfig::with_api_key("abc");
        assert_eq!(config.cookie_name(), "abc_ak");
        assert_eq!(config.freshness(), chrono::Duration::hours(1));

        let delays: Vec<_> = config.hedge().schedule().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3)
            ]
        );
    }

    #[test]
    fn test_merge_keeps_unspecified_settings() {
        let config = OAuthConfig::with_api_key("abc");
        let merged = config
            .merged(json!({"redirectUrl": "https://app.test/", "apiKey": null}))
            .unwrap();

        assert_eq!(merged.api_key, "abc");
        assert_eq!(merged.redirect_url.as_deref(), Some("https://app.test/"));
        assert_eq!(merged.freshness_secs, 3600);

        let replaced = merged.merged(json!({"apiKey": "def"})).unwrap();
        assert_eq!(replaced.api_key, "def");
        assert_eq!(replaced.redirect_url.as_deref(), Some("https://app.test/"));
    }

    #[test]
    fn test_merge_rejects_bad_input() {
        let config = OAuthConfig::default();
        assert!(config.merged(json!("abc")).is_err());
        assert!(config.merged(json!({"freshnessSecs": "soon"})).is_err());
        assert!(config.merged(Value::Null).is_ok());
    }
}
