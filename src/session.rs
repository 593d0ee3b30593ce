//! Authenticated provider sessions
//!
//! A session is the cookie set obtained by logging in to a provider, plus the
//! identity it was obtained for. Sessions are read-only once created and can
//! be persisted between runs.

use crate::cache::{CacheError, CacheStorage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single authentication cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// An authenticated cookie set for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Name of the provider this session belongs to
    pub provider: String,
    /// The user the session was obtained for
    pub identity: String,
    /// Cookies in the order the provider set them
    pub cookies: Vec<Cookie>,
}

impl Session {
    pub fn new(provider: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            identity: identity.into(),
            cookies: Vec::new(),
        }
    }

    /// Adds or replaces a cookie
    pub fn set_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|cookie| cookie.name == name) {
            Some(cookie) => cookie.value = value,
            None => self.cookies.push(Cookie { name, value }),
        }
    }

    /// Looks up a cookie value by name
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|cookie| cookie.name == name)
            .map(|cookie| cookie.value.as_str())
    }

    /// Renders the cookies as the value of a `Cookie` request header
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Persistent sessions keyed by provider name
pub struct SessionStore {
    storage: CacheStorage<Session>,
}

impl SessionStore {
    /// Opens the session store in the application's cache directory
    pub fn open() -> Result<Self, CacheError> {
        Ok(Self {
            storage: CacheStorage::open("sessions")?,
        })
    }

    /// Opens a session store in an explicit directory
    pub fn open_in(dir: &Path) -> Result<Self, CacheError> {
        Ok(Self {
            storage: CacheStorage::open_in(dir)?,
        })
    }

    pub fn load(&self, provider: &str) -> Result<Option<Session>, CacheError> {
        self.storage.load(provider)
    }

    pub fn store(&self, session: &Session) -> Result<(), CacheError> {
        self.storage.store(&session.provider, session)
    }

    /// Forgets every stored session
    pub fn clear(&self) -> Result<(), CacheError> {
        self.storage.clear()
    }
}
