//! Session verdict cache.
//!
//! [`SessionCache`] maps a [`Fingerprint`] to the [`SessionRecord`] the
//! authenticator returned for it, so repeated requests with the same cookies
//! skip the round trip. The variant is picked once from the configured TTL:
//! a zero TTL yields [`SessionCache::Disabled`], where every lookup misses.
//!
//! # Expiry
//!
//! Each insert stamps the entry with a fresh version and spawns a timer for
//! that version. When the timer fires it removes the entry only if the stored
//! version is still the one it was scheduled for, so a slow timer never
//! evicts a record that was refreshed after it was armed.
//!
//! Timers watch the cache's lifetime token. Once the token is cancelled no
//! further expiry happens: pending timers stop and later inserts are never
//! scheduled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::session::{Fingerprint, SessionRecord};

/// Cache of authenticator verdicts keyed by session fingerprint.
#[derive(Debug, Clone)]
pub enum SessionCache {
    /// Caching is off; `get` always misses and writes are dropped.
    Disabled,
    /// In-memory cache with per-entry expiry.
    Ttl(TtlCache),
}

impl SessionCache {
    /// Create a cache for the given TTL, bound to a lifetime token.
    pub fn new(ttl: Duration, lifetime: CancellationToken) -> Self {
        if ttl.is_zero() {
            Self::Disabled
        } else {
            Self::Ttl(TtlCache::new(ttl, lifetime))
        }
    }

    /// Look up a cached verdict.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<SessionRecord>> {
        match self {
            Self::Disabled => None,
            Self::Ttl(cache) => cache.get(fingerprint),
        }
    }

    /// Store a verdict, replacing any previous one for the fingerprint.
    pub fn set(&self, fingerprint: &Fingerprint, record: Arc<SessionRecord>) {
        if let Self::Ttl(cache) = self {
            cache.set(fingerprint, record);
        }
    }

    /// Drop any cached verdict for the fingerprint.
    pub fn delete(&self, fingerprint: &Fingerprint) {
        if let Self::Ttl(cache) = self {
            cache.delete(fingerprint);
        }
    }

    /// Returns `true` unless caching is disabled.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Ttl(_))
    }
}

/// TTL cache backed by a concurrent map.
///
/// Cheap to clone (Arc internals).
#[derive(Debug, Clone)]
pub struct TtlCache {
    inner: Arc<TtlCacheInner>,
}

#[derive(Debug)]
struct TtlCacheInner {
    ttl: Duration,
    store: DashMap<Fingerprint, Entry>,
    next_version: AtomicU64,
    lifetime: CancellationToken,
}

#[derive(Debug)]
struct Entry {
    version: u64,
    record: Arc<SessionRecord>,
}

impl TtlCache {
    /// Create a cache whose entries expire `ttl` after insertion.
    pub fn new(ttl: Duration, lifetime: CancellationToken) -> Self {
        Self {
            inner: Arc::new(TtlCacheInner {
                ttl,
                store: DashMap::new(),
                next_version: AtomicU64::new(0),
                lifetime,
            }),
        }
    }

    /// Look up a cached verdict.
    ///
    /// The empty fingerprint is shared by every cookie-less client and is
    /// never cached.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<SessionRecord>> {
        if fingerprint.is_empty() {
            return None;
        }
        self.inner
            .store
            .get(fingerprint)
            .map(|entry| Arc::clone(&entry.record))
    }

    /// Store a verdict and arm its expiry timer.
    pub fn set(&self, fingerprint: &Fingerprint, record: Arc<SessionRecord>) {
        if fingerprint.is_empty() {
            return;
        }

        let version = self.inner.next_version.fetch_add(1, Ordering::Relaxed);
        self.inner
            .store
            .insert(fingerprint.clone(), Entry { version, record });

        if self.inner.lifetime.is_cancelled() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(expire(
                    Arc::downgrade(&self.inner),
                    fingerprint.clone(),
                    version,
                ));
            }
            Err(e) => {
                log::warn!("No runtime to schedule session expiry, entry {fingerprint} is kept: {e}");
            }
        }
    }

    /// Remove a verdict immediately.
    pub fn delete(&self, fingerprint: &Fingerprint) {
        self.inner.store.remove(fingerprint);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// The configured time to live.
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }
}

async fn expire(cache: Weak<TtlCacheInner>, fingerprint: Fingerprint, version: u64) {
    let (ttl, lifetime) = match cache.upgrade() {
        Some(inner) => (inner.ttl, inner.lifetime.clone()),
        None => return,
    };

    tokio::select! {
        _ = tokio::time::sleep(ttl) => {}
        _ = lifetime.cancelled() => return,
    }

    if lifetime.is_cancelled() {
        return;
    }

    if let Some(inner) = cache.upgrade() {
        let removed = inner
            .store
            .remove_if(&fingerprint, |_, entry| entry.version == version);
        if removed.is_some() {
            log::debug!("Session {fingerprint} expired from cache");
        }
    }
}
