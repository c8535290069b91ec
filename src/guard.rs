//! Request guard that applies throttle decisions around a handled request.
//!
//! The guard is framework agnostic: the integration layer calls
//! [`RequestGuard::before`] ahead of its handler and [`RequestGuard::after`]
//! with the response status once the handler is done.

use tracing::{debug, warn};

use crate::error::Result;
use crate::throttle::{ClientRequest, Decision, Throttle};

/// What to do with a request that exceeded its green retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverLimitAction {
    /// Hold the request for the applied delay, then let it through
    #[default]
    Delay,
    /// Refuse the request without waiting
    Reject,
}

/// Result of [`RequestGuard::before`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No decision was made (throttling disabled, or a store failure with
    /// fail-open enabled)
    Unchecked,
    /// The request may be handled; any delay has already been served
    Proceed(Decision),
    /// The request must not be handled
    Rejected(Decision),
}

impl Verdict {
    /// Whether the caller should go on to handle the request.
    pub fn should_proceed(&self) -> bool {
        !matches!(self, Verdict::Rejected(_))
    }

    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Verdict::Unchecked => None,
            Verdict::Proceed(decision) | Verdict::Rejected(decision) => Some(decision),
        }
    }
}

/// Per-endpoint guard configuration.
#[derive(Debug, Clone)]
pub struct RequestGuard {
    operation: Option<String>,
    auto_release: bool,
    action: OverLimitAction,
    fail_open: bool,
}

impl Default for RequestGuard {
    fn default() -> Self {
        Self {
            operation: None,
            auto_release: true,
            action: OverLimitAction::default(),
            fail_open: false,
        }
    }
}

impl RequestGuard {
    /// Guard keyed by the request path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard keyed by a fixed operation name.
    pub fn named(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Self::default()
        }
    }

    /// Never release automatically after the handler runs.
    pub fn without_auto_release(mut self) -> Self {
        self.auto_release = false;
        self
    }

    pub fn on_over_limit(mut self, action: OverLimitAction) -> Self {
        self.action = action;
        self
    }

    /// Let requests through when the store fails instead of returning the
    /// error.
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Operation name used for `request`.
    pub fn operation<'a>(&'a self, request: &'a ClientRequest) -> &'a str {
        request.operation_name(self.operation.as_deref())
    }

    /// Check the request and serve any delay.
    pub async fn before(&self, throttle: &Throttle, request: &ClientRequest) -> Result<Verdict> {
        let operation = self.operation(request);

        let decision = match throttle.check(operation, request).await {
            Ok(Some(decision)) => decision,
            Ok(None) => return Ok(Verdict::Unchecked),
            Err(e) if self.fail_open => {
                warn!(operation, error = %e, "Throttle check failed, letting request through");
                return Ok(Verdict::Unchecked);
            }
            Err(e) => return Err(e),
        };

        if decision.is_allowed {
            return Ok(Verdict::Proceed(decision));
        }

        match self.action {
            OverLimitAction::Delay => {
                debug!(
                    operation,
                    delay_ms = decision.applied_delay.as_millis() as u64,
                    "Delaying request"
                );
                tokio::time::sleep(decision.applied_delay).await;
                Ok(Verdict::Proceed(decision))
            }
            OverLimitAction::Reject => {
                debug!(operation, hit_count = decision.hit_count, "Rejecting request");
                Ok(Verdict::Rejected(decision))
            }
        }
    }

    /// Report the handler's response status; releases the counter when the
    /// status is configured for auto release.
    ///
    /// Returns whether a release was triggered.
    pub async fn after(
        &self,
        throttle: &Throttle,
        request: &ClientRequest,
        status: u16,
    ) -> Result<bool> {
        if !self.auto_release {
            return Ok(false);
        }

        let operation = self.operation(request);
        match throttle.auto_release(status, operation, request).await {
            Ok(released) => Ok(released),
            Err(e) if self.fail_open => {
                warn!(operation, error = %e, "Auto release failed");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::throttle::{LocalEntryStore, MockClock};
    use std::sync::Arc;
    use std::time::Duration;

    fn throttle(green_retries: u32) -> Throttle {
        Throttle::builder(GuardConfig {
            green_retries,
            increase_request_time_ms: 100,
            ..GuardConfig::default()
        })
        .local_store(Arc::new(LocalEntryStore::new()))
        .clock(Arc::new(MockClock::default()))
        .build()
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_before_delays_over_limit_requests() {
        let throttle = throttle(1);
        let guard = RequestGuard::named("login");
        let request = ClientRequest::new("127.0.0.1", "POST", "/login");

        let verdict = guard.before(&throttle, &request).await.unwrap();
        assert!(matches!(verdict, Verdict::Proceed(ref d) if d.is_allowed));

        let started = tokio::time::Instant::now();
        let verdict = guard.before(&throttle, &request).await.unwrap();
        assert!(verdict.should_proceed());
        assert_eq!(verdict.decision().unwrap().hit_count, 2);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_before_rejects_when_configured() {
        let throttle = throttle(0);
        let guard = RequestGuard::named("login").on_over_limit(OverLimitAction::Reject);
        let request = ClientRequest::new("127.0.0.1", "POST", "/login");

        let verdict = guard.before(&throttle, &request).await.unwrap();
        assert!(!verdict.should_proceed());
        assert_eq!(verdict.decision().unwrap().applied_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_operation_defaults_to_path() {
        let throttle = throttle(5);
        let guard = RequestGuard::new();
        let request = ClientRequest::new("127.0.0.1", "POST", "/account/login");

        guard.before(&throttle, &request).await.unwrap();
        assert_eq!(
            throttle.counter_value("/account/login", &request).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_after_auto_releases_on_success() {
        let throttle = throttle(5);
        let guard = RequestGuard::named("login");
        let request = ClientRequest::new("127.0.0.1", "POST", "/login");

        guard.before(&throttle, &request).await.unwrap();
        guard.before(&throttle, &request).await.unwrap();

        assert!(!guard.after(&throttle, &request, 401).await.unwrap());
        assert_eq!(throttle.counter_value("login", &request).await.unwrap(), Some(2));

        assert!(guard.after(&throttle, &request, 200).await.unwrap());
        assert_eq!(throttle.counter_value("login", &request).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_after_without_auto_release() {
        let throttle = throttle(5);
        let guard = RequestGuard::named("login").without_auto_release();
        let request = ClientRequest::new("127.0.0.1", "POST", "/login");

        guard.before(&throttle, &request).await.unwrap();
        assert!(!guard.after(&throttle, &request, 200).await.unwrap());
        assert_eq!(throttle.counter_value("login", &request).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_disabled_throttle_is_unchecked() {
        let throttle = Throttle::builder(GuardConfig {
            enabled: false,
            ..GuardConfig::default()
        })
        .local_store(Arc::new(LocalEntryStore::new()))
        .build()
        .unwrap();
        let request = ClientRequest::new("127.0.0.1", "GET", "/");

        let verdict = RequestGuard::new().before(&throttle, &request).await.unwrap();
        assert_eq!(verdict, Verdict::Unchecked);
        assert!(verdict.should_proceed());
    }

    struct UnreachableCache;

    #[async_trait::async_trait]
    impl crate::throttle::SharedCache for UnreachableCache {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(crate::BruteGuardError::Store("unreachable".to_string()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<()> {
            Err(crate::BruteGuardError::Store("unreachable".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Err(crate::BruteGuardError::Store("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fail_open_on_store_error() {
        let throttle = Throttle::builder(GuardConfig::default())
            .shared_cache(Arc::new(UnreachableCache))
            .build()
            .unwrap();
        let request = ClientRequest::new("127.0.0.1", "POST", "/login");

        assert!(RequestGuard::named("login").before(&throttle, &request).await.is_err());

        let verdict = RequestGuard::named("login")
            .fail_open()
            .before(&throttle, &request)
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Unchecked);
    }
}
