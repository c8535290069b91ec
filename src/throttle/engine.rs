//! Core throttling engine.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, trace};

use super::clock::{Clock, SystemClock};
use super::identity::{mask_identity, IdentityKey};
use super::record::IdentityRecord;
use super::request::ClientRequest;
use super::store::{EntryStore, LocalEntryStore, SharedCache, SharedEntryStore};
use super::window::ResetWindow;
use crate::config::GuardConfig;
use crate::error::{BruteGuardError, Result};

/// Number of lock stripes guarding read-modify-write cycles.
const LOCK_STRIPES: usize = 64;

/// Outcome of a throttle check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// `true` while the hit count is within the green retries
    pub is_allowed: bool,
    /// Delay the caller should impose; zero when allowed
    pub applied_delay: Duration,
    /// Hits recorded for this operation, including the current one
    pub hit_count: u64,
    /// When the counter expires if no further attempts arrive
    pub reset_at: DateTime<Utc>,
    /// The client identity the decision applies to
    pub identity: String,
}

/// Counts attempts per client identity and operation and turns overage into
/// a delay.
///
/// Checks and releases for the same identity are serialized inside one
/// process. Instances sharing an external cache are only best-effort
/// consistent with each other.
pub struct Throttle {
    config: GuardConfig,
    window: ResetWindow,
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    locks: Vec<Mutex<()>>,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("config", &self.config)
            .field("backend", &self.store.backend_name())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Throttle {
    /// Start building a throttle with the given configuration.
    pub fn builder(config: GuardConfig) -> ThrottleBuilder {
        ThrottleBuilder::new(config)
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn window(&self) -> ResetWindow {
        self.window
    }

    /// Name of the active store backend (`local` or `shared`).
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    async fn lock(&self, key: &IdentityKey) -> MutexGuard<'_, ()> {
        self.locks[key.stripe(self.locks.len())].lock().await
    }

    /// Record an attempt of `operation` and decide whether it is green.
    ///
    /// Returns `None` when throttling is disabled.
    #[instrument(
        skip(self, operation, request),
        fields(operation = %operation, method = %request.method)
    )]
    pub async fn check(
        &self,
        operation: &str,
        request: &ClientRequest,
    ) -> Result<Option<Decision>> {
        if !self.config.enabled {
            debug!("Throttling is disabled, skipping check");
            return Ok(None);
        }

        let key = IdentityKey::derive(&request.identity);
        let _guard = self.lock(&key).await;
        let now = self.clock.now();

        trace!(
            identity = %mask_identity(&request.identity),
            identity_key = %key,
            "Checking request entries"
        );

        let mut record = self
            .store
            .load(&key)
            .await?
            .unwrap_or_else(|| IdentityRecord::new(&request.identity));

        let pruned = record.prune_expired(&self.window, now);
        if pruned > 0 {
            trace!(pruned, "Pruned expired request signatures");
        }

        let (hit_count, last_hit) = {
            let signature = record.record_hit(operation, request, now);
            (signature.hit_count, signature.last_hit)
        };

        self.store.save(&key, &record).await?;

        let decision = self.decide(hit_count, last_hit, &request.identity);

        if decision.is_allowed {
            debug!(
                hit_count,
                reset_at = %decision.reset_at,
                "Green request"
            );
        } else {
            debug!(
                hit_count,
                green_retries = self.config.green_retries,
                delay_ms = decision.applied_delay.as_millis() as u64,
                reset_at = %decision.reset_at,
                "Request exceeded green retries, appending delay"
            );
        }

        Ok(Some(decision))
    }

    /// Forget the active counter of `operation` for the requesting identity.
    ///
    /// Returns `true` when a counter was removed or when nothing is tracked
    /// for the identity at all, and `false` when the identity has other
    /// active counters but none for this operation and method.
    #[instrument(
        skip(self, operation, request),
        fields(operation = %operation, method = %request.method)
    )]
    pub async fn release(&self, operation: &str, request: &ClientRequest) -> Result<bool> {
        if !self.config.enabled {
            return Ok(true);
        }

        let key = IdentityKey::derive(&request.identity);
        let _guard = self.lock(&key).await;
        let now = self.clock.now();

        let Some(mut record) = self.store.load(&key).await? else {
            debug!(identity_key = %key, "No entry found, already released or never recorded");
            return Ok(true);
        };

        let pruned = record.prune_expired(&self.window, now);

        if record.is_empty() {
            if pruned > 0 {
                self.store.save(&key, &record).await?;
            }
            debug!(identity_key = %key, "No active counters, nothing to release");
            return Ok(true);
        }

        match record.remove(operation, &request.method) {
            Some(removed) => {
                self.store.save(&key, &record).await?;
                debug!(
                    identity_key = %key,
                    hit_count = removed.hit_count,
                    "Released request counter"
                );
                Ok(true)
            }
            None => {
                if pruned > 0 {
                    self.store.save(&key, &record).await?;
                }
                debug!(identity_key = %key, "No active counter for this operation");
                Ok(false)
            }
        }
    }

    /// Release `operation` if `status` is one of the configured auto-release
    /// status codes.
    ///
    /// Returns whether the status triggered a release; storage is untouched
    /// otherwise.
    pub async fn auto_release(
        &self,
        status: u16,
        operation: &str,
        request: &ClientRequest,
    ) -> Result<bool> {
        if !self.config.is_auto_release_status(status) {
            trace!(status, operation, "Status does not trigger auto release");
            return Ok(false);
        }

        self.release(operation, request).await?;
        Ok(true)
    }

    /// Current hit count of `operation` for the requesting identity, without
    /// recording a hit.
    pub async fn counter_value(
        &self,
        operation: &str,
        request: &ClientRequest,
    ) -> Result<Option<u64>> {
        let key = IdentityKey::derive(&request.identity);
        let _guard = self.lock(&key).await;
        let now = self.clock.now();

        let Some(mut record) = self.store.load(&key).await? else {
            return Ok(None);
        };

        record.prune_expired(&self.window, now);
        Ok(record
            .find(operation, &request.method)
            .map(|signature| signature.hit_count))
    }

    fn decide(&self, hit_count: u64, last_hit: DateTime<Utc>, identity: &str) -> Decision {
        let green_retries = self.config.green_retries as u64;
        let is_allowed = hit_count <= green_retries;

        let applied_delay = if is_allowed {
            Duration::ZERO
        } else {
            let excess = hit_count - green_retries;
            Duration::from_millis(excess.saturating_mul(self.config.increase_request_time_ms))
        };

        Decision {
            is_allowed,
            applied_delay,
            hit_count,
            reset_at: self.window.reset_at(last_hit),
            identity: identity.to_string(),
        }
    }
}

/// Builder wiring a [`Throttle`] to its store and clock.
///
/// Exactly one store backend is used: a local store wins over a shared
/// cache when both are supplied.
pub struct ThrottleBuilder {
    config: GuardConfig,
    local: Option<Arc<LocalEntryStore>>,
    shared: Option<Arc<dyn SharedCache>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ThrottleBuilder {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            local: None,
            shared: None,
            clock: None,
        }
    }

    /// Use a process-local store.
    pub fn local_store(mut self, store: Arc<LocalEntryStore>) -> Self {
        self.local = Some(store);
        self
    }

    /// Use a shared external cache.
    pub fn shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.shared = Some(cache);
        self
    }

    /// Override the clock (defaults to [`SystemClock`]).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the throttle.
    ///
    /// Fails with [`BruteGuardError::DependencyMissing`] when neither a local
    /// store nor a shared cache was supplied.
    pub fn build(self) -> Result<Throttle> {
        let store: Arc<dyn EntryStore> = match (self.local, self.shared) {
            (Some(local), _) => local as Arc<dyn EntryStore>,
            (None, Some(cache)) => Arc::new(SharedEntryStore::new(cache)) as Arc<dyn EntryStore>,
            (None, None) => {
                error!("No local store or shared cache registered");
                return Err(BruteGuardError::DependencyMissing(
                    "throttling requires a local entry store or a shared cache".to_string(),
                ));
            }
        };

        let config = self.config.normalized();
        let window = config.window();

        info!(
            backend = store.backend_name(),
            enabled = config.enabled,
            green_retries = config.green_retries,
            window = %window,
            "Throttle initialized"
        );

        Ok(Throttle {
            config,
            window,
            store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }
}
