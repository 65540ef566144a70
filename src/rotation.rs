//! Round-robin API key rotation.
//!
//! Each call to [`CredentialRotator::next`] hands out the key under the cursor
//! and moves the cursor one slot forward, wrapping at the end. With N keys,
//! call `i` returns key `i % N`, so every key is revisited every N calls.

use crate::{ContextError, Result};
use std::sync::{Mutex, PoisonError};

/// An opaque API key. Debug output only shows the last four characters.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for handing to the SDK client
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `...abcd` form safe for logs
    pub fn masked(&self) -> String {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("...{}", tail)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Hands out credentials round-robin. Safe to share across threads.
#[derive(Debug)]
pub struct CredentialRotator {
    credentials: Vec<Credential>,
    /// Index of the credential the next call returns
    cursor: Mutex<usize>,
}

impl CredentialRotator {
    /// Create a rotator over a non-empty, ordered set of credentials.
    pub fn new(credentials: Vec<Credential>) -> Result<Self> {
        if credentials.is_empty() {
            return Err(ContextError::Configuration(
                "at least one API key is required".to_string(),
            ));
        }
        Ok(Self {
            credentials,
            cursor: Mutex::new(0),
        })
    }

    /// Parse a comma-separated key list. Blank entries are dropped.
    pub fn from_list(list: &str) -> Result<Self> {
        let credentials = list
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(Credential::from)
            .collect();
        Self::new(credentials)
    }

    /// Read a comma-separated key list from an environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let list = std::env::var(var).map_err(|_| {
            ContextError::Configuration(format!("{} is not set", var))
        })?;
        Self::from_list(&list)
    }

    /// Return the credential under the cursor and advance the cursor.
    pub fn next(&self) -> Credential {
        // The cursor is a plain index; a panic elsewhere cannot leave it torn.
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let credential = self.credentials[*cursor].clone();
        *cursor = (*cursor + 1) % self.credentials.len();
        credential
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}
