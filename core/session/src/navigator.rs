//! Host navigation abstraction.

use std::sync::{Mutex, PoisonError};

use fsgate_common::Result;

use crate::manager::Navigation;

/// The host's notion of "where we are" and "go there".
pub trait Navigator: Send + Sync {
    /// The current location, including any fragment.
    fn current_location(&self) -> Option<String>;

    /// Ask the host to navigate.
    fn navigate(&self, navigation: &Navigation) -> Result<()>;
}

/// Navigator that records navigations and follows them in memory.
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    location: Mutex<Option<String>>,
    history: Mutex<Vec<Navigation>>,
}

impl MemoryNavigator {
    pub fn new(location: Option<String>) -> Self {
        Self {
            location: Mutex::new(location),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Replace the current location.
    pub fn set_location(&self, location: impl Into<String>) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = Some(location.into());
    }

    /// Every navigation requested so far, oldest first.
    pub fn history(&self) -> Vec<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for MemoryNavigator {
    fn current_location(&self) -> Option<String> {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, navigation: &Navigation) -> Result<()> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(navigation.clone());
        self.set_location(navigation.url.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_follows_and_records() {
        let navigator = MemoryNavigator::new(Some("https://app.test/#access_token=x".to_string()));
        navigator
            .navigate(&Navigation::strip_callback("https://app.test/"))
            .unwrap();

        assert_eq!(
            navigator.current_location().as_deref(),
            Some("https://app.test/")
        );
        assert_eq!(navigator.history().len(), 1);
    }
}
