//! Brute-force throttling logic and state management.

mod clock;
mod engine;
mod identity;
mod record;
#[cfg(feature = "redis")]
mod redis_cache;
mod request;
mod store;
mod window;

pub use clock::{Clock, MockClock, SystemClock};
pub use engine::{Decision, Throttle, ThrottleBuilder};
pub use identity::{mask_identity, IdentityKey};
pub use record::{IdentityRecord, RequestSignature};
#[cfg(feature = "redis")]
pub use redis_cache::{RedisCacheConfig, RedisSharedCache};
pub use request::ClientRequest;
pub use store::{
    EntryStore, InMemorySharedCache, LocalEntryStore, SharedCache, SharedEntryStore,
    PAYLOAD_VERSION,
};
pub use window::{ResetWindow, TimeUnit};
