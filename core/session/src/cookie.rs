//! Cookie persistence for session tokens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use fsgate_common::Result;

/// Longest lifetime a cookie is kept for in seconds, the cap browsers apply.
pub const MAX_COOKIE_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// A named value with an expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Cookie {
    /// Cookie expiring after `max_age`, capped at [`MAX_COOKIE_AGE_SECS`].
    fn new(value: &str, max_age: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Utc::now() + max_age.min(Duration::seconds(MAX_COOKIE_AGE_SECS)),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// Cookie jar for session tokens.
///
/// Expired cookies read as absent.
pub trait CookieStore: Send + Sync {
    fn read(&self, name: &str) -> Result<Option<String>>;

    fn write(&self, name: &str, value: &str, max_age: Duration) -> Result<()>;

    fn clear(&self, name: &str) -> Result<()>;
}

/// In-memory cookie jar.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored cookie, expired or not.
    pub fn get(&self, name: &str) -> Option<Cookie> {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl CookieStore for MemoryCookieStore {
    fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .get(name)
            .filter(Cookie::is_live)
            .map(|cookie| cookie.value))
    }

    fn write(&self, name: &str, value: &str, max_age: Duration) -> Result<()> {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Cookie::new(value, max_age));
        Ok(())
    }

    fn clear(&self, name: &str) -> Result<()> {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}

/// Cookie jar persisted as a JSON file.
pub struct FileCookieStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCookieStore {
    /// Use the jar at `path`; it is created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the jar.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, Cookie>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        // An unreadable jar behaves like an empty one.
        Ok(serde_json::from_str(&content).unwrap_or_default())
    }

    fn persist(&self, cookies: &HashMap<String, Cookie>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(cookies)?;
        fs::write(&self.path, json)?;
        debug!("Saved cookie jar to {}", self.path.display());
        Ok(())
    }
}

impl CookieStore for FileCookieStore {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self
            .load()?
            .remove(name)
            .filter(Cookie::is_live)
            .map(|cookie| cookie.value))
    }

    fn write(&self, name: &str, value: &str, max_age: Duration) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cookies = self.load()?;
        cookies.retain(|_, cookie| cookie.is_live());
        cookies.insert(name.to_string(), Cookie::new(value, max_age));
        self.persist(&cookies)
    }

    fn clear(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cookies = self.load()?;
        if cookies.remove(name).is_some() {
            self.persist(&cookies)?;
        }
        Ok(())
    }
}
