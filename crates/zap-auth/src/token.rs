//! In-process bearer token cache

use std::sync::RwLock;

use zap_core::TokenSource;

/// Shared cache for the current bearer token.
///
/// Cleared on logout and whenever a request comes back 401/403, forcing
/// the next operation to fail locally until a fresh sign-in happens.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: RwLock<Option<String>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly issued token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().expect("token lock poisoned") = Some(token.into());
    }
}

impl TokenSource for TokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().expect("token lock poisoned").clone()
    }

    fn invalidate(&self) {
        *self.token.write().expect("token lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let store = TokenStore::new();
        assert!(store.token().is_none());

        store.set("abc123");
        assert_eq!(store.token(), Some("abc123".to_string()));
    }

    #[test]
    fn test_invalidate() {
        let store = TokenStore::new();
        store.set("abc123");
        store.invalidate();
        assert!(store.token().is_none());
    }
}
