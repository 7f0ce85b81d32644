//! Primary store with a file fallback.
//!
//! The primary (the OS keyring) is used while it works. Once it reports
//! itself unavailable the store switches to the secondary for the rest of
//! the process and never tries the primary again.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use super::store::{StoredToken, TokenStore};
use super::AuthError;

/// Which backends a [`FallbackStore`] is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Primary first, secondary as backup and fallback.
    PrimaryAvailable,
    /// Secondary only. Terminal.
    PrimaryUnavailable,
}

pub struct FallbackStore<P, S> {
    primary: P,
    secondary: S,
    mode: Mutex<StoreMode>,
}

impl<P: TokenStore, S: TokenStore> FallbackStore<P, S> {
    /// Start with the primary assumed available.
    pub const fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            mode: Mutex::new(StoreMode::PrimaryAvailable),
        }
    }

    /// Use only the secondary.
    pub const fn secondary_only(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            mode: Mutex::new(StoreMode::PrimaryUnavailable),
        }
    }

    /// Start after checking whether the primary answers at all.
    pub fn probe(primary: P, secondary: S) -> Self {
        let store = Self::new(primary, secondary);
        if let Err(e) = store.primary.load() {
            if e.is_unavailable() {
                store.mark_unavailable(&e);
            }
        }
        store
    }

    /// Current mode.
    pub fn mode(&self) -> StoreMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn primary_usable(&self) -> bool {
        self.mode() == StoreMode::PrimaryAvailable
    }

    fn mark_unavailable(&self, err: &AuthError) {
        let mut mode = self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        if *mode == StoreMode::PrimaryAvailable {
            warn!(
                primary = self.primary.name(),
                fallback = self.secondary.name(),
                error = %err,
                "Credential store unavailable, using fallback"
            );
            *mode = StoreMode::PrimaryUnavailable;
        }
    }

    fn primary_failed(&self, op: &str, err: &AuthError) {
        if err.is_unavailable() {
            self.mark_unavailable(err);
        } else {
            debug!(op, primary = self.primary.name(), error = %err, "Primary credential store failed");
        }
    }
}

impl<P: TokenStore, S: TokenStore> TokenStore for FallbackStore<P, S> {
    fn name(&self) -> &'static str {
        if self.primary_usable() {
            self.primary.name()
        } else {
            self.secondary.name()
        }
    }

    fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        if self.primary_usable() {
            match self.primary.load() {
                Ok(Some(token)) => return Ok(Some(token)),
                Ok(None) => {}
                Err(e) => self.primary_failed("load", &e),
            }
        }
        self.secondary.load()
    }

    fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
        if self.primary_usable() {
            match self.primary.save(token) {
                Ok(()) => {
                    if let Err(e) = self.secondary.save(token) {
                        debug!(error = %e, "Backup token write failed");
                    }
                    return Ok(());
                }
                Err(e) => self.primary_failed("save", &e),
            }
        }
        self.secondary.save(token)
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut primary_err = None;
        if self.primary_usable() {
            if let Err(e) = self.primary.clear() {
                if e.is_unavailable() {
                    self.mark_unavailable(&e);
                } else {
                    primary_err = Some(e);
                }
            }
        }
        self.secondary.clear()?;
        primary_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Works,
        Unavailable,
        Broken,
    }

    struct MemoryStore {
        name: &'static str,
        behavior: Behavior,
        token: Mutex<Option<StoredToken>>,
        calls: AtomicUsize,
    }

    impl MemoryStore {
        fn new(name: &'static str, behavior: Behavior) -> Self {
            Self {
                name,
                behavior,
                token: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        fn holding(self, token: &str) -> Self {
            *self.token.lock().unwrap() = Some(StoredToken::new(token));
            self
        }

        fn check(&self) -> Result<(), AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Works => Ok(()),
                Behavior::Unavailable => Err(AuthError::Unavailable {
                    backend: self.name,
                    message: "Cannot autolaunch D-Bus".into(),
                }),
                Behavior::Broken => Err(AuthError::Store {
                    backend: self.name,
                    message: "denied".into(),
                }),
            }
        }

        fn stored(&self) -> Option<StoredToken> {
            self.token.lock().unwrap().clone()
        }
    }

    impl TokenStore for MemoryStore {
        fn name(&self) -> &'static str {
            self.name
        }

        fn load(&self) -> Result<Option<StoredToken>, AuthError> {
            self.check()?;
            Ok(self.stored())
        }

        fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
            self.check()?;
            *self.token.lock().unwrap() = Some(token.clone());
            Ok(())
        }

        fn clear(&self) -> Result<(), AuthError> {
            self.check()?;
            *self.token.lock().unwrap() = None;
            Ok(())
        }
    }

    #[test]
    fn test_primary_wins_when_available() {
        let store = FallbackStore::new(
            MemoryStore::new("primary", Behavior::Works).holding("p"),
            MemoryStore::new("secondary", Behavior::Works).holding("s"),
        );
        assert_eq!(store.load().unwrap().unwrap().access_token, "p");
        assert_eq!(store.mode(), StoreMode::PrimaryAvailable);
        assert_eq!(store.name(), "primary");
    }

    #[test]
    fn test_empty_primary_falls_through() {
        let store = FallbackStore::new(
            MemoryStore::new("primary", Behavior::Works),
            MemoryStore::new("secondary", Behavior::Works).holding("s"),
        );
        assert_eq!(store.load().unwrap().unwrap().access_token, "s");
        assert_eq!(store.mode(), StoreMode::PrimaryAvailable);
    }

    #[test]
    fn test_unavailable_primary_switches_once() {
        let store = FallbackStore::new(
            MemoryStore::new("primary", Behavior::Unavailable),
            MemoryStore::new("secondary", Behavior::Works).holding("s"),
        );

        assert_eq!(store.load().unwrap().unwrap().access_token, "s");
        assert_eq!(store.mode(), StoreMode::PrimaryUnavailable);

        store.load().unwrap();
        store.save(&StoredToken::new("x")).unwrap();
        assert_eq!(store.primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.name(), "secondary");
    }

    #[test]
    fn test_broken_primary_does_not_switch() {
        let store = FallbackStore::new(
            MemoryStore::new("primary", Behavior::Broken),
            MemoryStore::new("secondary", Behavior::Works).holding("s"),
        );

        assert_eq!(store.load().unwrap().unwrap().access_token, "s");
        assert_eq!(store.mode(), StoreMode::PrimaryAvailable);
        store.load().unwrap();
        assert_eq!(store.primary.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_save_writes_backup() {
        let store = FallbackStore::new(
            MemoryStore::new("primary", Behavior::Works),
            MemoryStore::new("secondary", Behavior::Works),
        );
        store.save(&StoredToken::new("t")).unwrap();
        assert_eq!(store.primary.stored(), Some(StoredToken::new("t")));
        assert_eq!(store.secondary.stored(), Some(StoredToken::new("t")));
    }

    #[test]
    fn test_probe_detects_unavailable_primary() {
        let store = FallbackStore::probe(
            MemoryStore::new("primary", Behavior::Unavailable),
            MemoryStore::new("secondary", Behavior::Works),
        );
        assert_eq!(store.mode(), StoreMode::PrimaryUnavailable);

        let store = FallbackStore::probe(
            MemoryStore::new("primary", Behavior::Works),
            MemoryStore::new("secondary", Behavior::Works),
        );
        assert_eq!(store.mode(), StoreMode::PrimaryAvailable);
    }

    #[test]
    fn test_secondary_only_never_touches_primary() {
        let store = FallbackStore::secondary_only(
            MemoryStore::new("primary", Behavior::Works).holding("p"),
            MemoryStore::new("secondary", Behavior::Works).holding("s"),
        );
        assert_eq!(store.load().unwrap().unwrap().access_token, "s");
        store.clear().unwrap();
        assert_eq!(store.primary.calls.load(Ordering::SeqCst), 0);
        assert!(store.primary.stored().is_some());
    }

    #[test]
    fn test_clear_both() {
        let store = FallbackStore::new(
            MemoryStore::new("primary", Behavior::Works).holding("p"),
            MemoryStore::new("secondary", Behavior::Works).holding("s"),
        );
        store.clear().unwrap();
        assert!(store.primary.stored().is_none());
        assert!(store.secondary.stored().is_none());
    }

    #[test]
    fn test_clear_reports_primary_failure() {
        let store = FallbackStore::new(
            MemoryStore::new("primary", Behavior::Broken),
            MemoryStore::new("secondary", Behavior::Works).holding("s"),
        );
        assert!(store.clear().is_err());
        assert!(store.secondary.stored().is_none());
    }
}
