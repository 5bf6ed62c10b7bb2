//! Sticky affinity between logical callers and application/node pairs.
//!
//! A cached [`StickyClient`] remembers the application and node a caller was
//! last routed to. Each entry carries two independent counters, one for
//! successful relays and one for failures. Every counter runs its own rolling
//! window: once the window elapses the counter starts over, and if a counter
//! goes past its limit within a window the whole entry is dropped.

use std::fmt;
use std::time::Duration;

use fnv::FnvHashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::StickySettings;
use crate::model::StickyOptions;
use crate::Result;

/// Identity of a logical caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StickyKey {
    /// Per-session numeric identifier, used when neither application nor
    /// load balancer is known.
    pub rpc_id: i64,
    pub load_balancer_id: String,
    pub application_id: String,
    pub blockchain_id: String,
    pub ip: String,
}

impl StickyKey {
    /// Builds the key for a caller. The rpc id only identifies callers known
    /// by neither application nor load balancer, and is dropped otherwise.
    pub fn new(
        rpc_id: i64,
        load_balancer_id: &str,
        application_id: &str,
        blockchain_id: &str,
        ip: &str,
    ) -> Self {
        let rpc_id = if load_balancer_id.is_empty() && application_id.is_empty() {
            rpc_id
        } else {
            0
        };
        Self {
            rpc_id,
            load_balancer_id: load_balancer_id.to_owned(),
            application_id: application_id.to_owned(),
            blockchain_id: blockchain_id.to_owned(),
            ip: ip.to_owned(),
        }
    }

    /// Empty keys disable stickiness for the request.
    pub fn is_empty(&self) -> bool {
        self.load_balancer_id.is_empty() && self.application_id.is_empty() && self.rpc_id <= 0
    }
}

impl fmt::Display for StickyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if !self.application_id.is_empty() {
            &self.application_id
        } else {
            &self.load_balancer_id
        };
        if prefix.is_empty() {
            write!(f, "{}-{}-{}", self.rpc_id, self.ip, self.blockchain_id)
        } else {
            write!(f, "{}-{}-{}", prefix, self.ip, self.blockchain_id)
        }
    }
}

/// Counter bound to a time window.
///
/// `ttl` of `None` marks a counter that was never started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountWithTtl {
    pub count: u32,
    pub ttl: Option<Instant>,
}

impl CountWithTtl {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.ttl.map_or(false, |ttl| now > ttl)
    }

    /// Counts one more event and returns the new count. An elapsed window is
    /// reset before counting, and the first event of a window starts it.
    fn increment(&mut self, now: Instant, window: Duration) -> u32 {
        if self.is_expired(now) {
            self.count = 0;
            self.ttl = None;
        }
        self.count += 1;
        if self.count == 1 {
            self.ttl = Some(now + window);
        }
        self.count
    }
}

/// Cached affinity record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StickyClient {
    pub preferred_application_id: String,
    pub preferred_node_address: String,

    pub relays: CountWithTtl,
    pub errors: CountWithTtl,
}

impl StickyClient {
    pub fn is_empty(&self) -> bool {
        self.preferred_application_id.is_empty() && self.preferred_node_address.is_empty()
    }

    pub fn node_matches(&self, address: &str) -> bool {
        !self.preferred_node_address.is_empty() && self.preferred_node_address == address
    }

    fn reset_counts(&mut self) {
        self.relays = CountWithTtl::default();
        self.errors = CountWithTtl::default();
    }
}

/// Sticky state travelling with a single request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StickyDetails {
    pub key: StickyKey,
    pub options: StickyOptions,
    pub client: StickyClient,
}

#[derive(Clone, Copy, Debug)]
enum Outcome {
    Success,
    Failure,
}

/// Affinity cache shared by all requests.
pub struct StickyCache {
    settings: StickySettings,
    default_client: StickyClient,
    items: Mutex<FnvHashMap<StickyKey, StickyClient>>,
}

impl StickyCache {
    pub fn new(settings: StickySettings) -> Self {
        Self {
            settings,
            default_client: StickyClient::default(),
            items: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Sets the snapshot handed out when the effective policy disables
    /// stickiness.
    pub fn with_default_client(mut self, client: StickyClient) -> Self {
        self.default_client = client;
        self
    }

    /// Resolves the sticky state for a request.
    ///
    /// Non-empty `options` take precedence over the gateway default. A
    /// disabled policy, an empty key or an origin the policy doesn't honor
    /// all yield details with empty options, which turns the subsequent
    /// [`success`](Self::success) and [`failure`](Self::failure) reports into
    /// no-ops.
    pub fn details<K, V>(
        &self,
        options: &StickyOptions,
        key_builder: K,
        verifier: V,
    ) -> StickyDetails
    where
        K: FnOnce(&StickyOptions) -> StickyKey,
        V: FnOnce(&StickyOptions) -> Result<()>,
    {
        let options = if options.is_empty() {
            &self.settings.default_options
        } else {
            options
        };

        if options.is_empty() {
            return StickyDetails {
                client: self.default_client.clone(),
                ..Default::default()
            };
        }

        let key = key_builder(options);
        if key.is_empty() {
            debug!("empty sticky look-up key, stickiness off for request");
            return StickyDetails::default();
        }

        if let Err(e) = verifier(options) {
            debug!("sticky options verification failed for {}: {}", key, e);
            return StickyDetails::default();
        }

        StickyDetails {
            client: self.get(&key).unwrap_or_default(),
            options: options.clone(),
            key,
        }
    }

    /// Returns the cached entry for the key.
    pub fn get(&self, key: &StickyKey) -> Option<StickyClient> {
        self.items.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Records a successful relay.
    pub fn success(&self, details: &mut StickyDetails) -> Result<()> {
        self.record(details, Outcome::Success)
    }

    /// Records a failed relay.
    pub fn failure(&self, details: &mut StickyDetails) -> Result<()> {
        self.record(details, Outcome::Failure)
    }

    fn record(&self, details: &mut StickyDetails, outcome: Outcome) -> Result<()> {
        if details.options.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let mut items = self.items.lock();

        // Cached state wins over whatever the caller was holding, except for
        // preferences the cached entry hasn't settled yet.
        match items.get(&details.key) {
            Some(cached) => {
                let mut client = cached.clone();
                if client.preferred_application_id.is_empty() {
                    client.preferred_application_id =
                        std::mem::take(&mut details.client.preferred_application_id);
                }
                if client.preferred_node_address.is_empty() {
                    client.preferred_node_address =
                        std::mem::take(&mut details.client.preferred_node_address);
                }
                details.client = client;
            }
            None => details.client.reset_counts(),
        }

        let (count, limit, counter) = match outcome {
            Outcome::Success => (
                details.client.relays.increment(now, self.settings.duration()),
                self.settings.relay_limit,
                "relay",
            ),
            Outcome::Failure => (
                details.client.errors.increment(now, self.settings.duration()),
                self.settings.max_errors,
                "error",
            ),
        };

        if count > limit {
            info!(
                "sticky entry {}: {} limit of {} reached, removing",
                details.key, counter, limit
            );
            items.remove(&details.key);
            return Ok(());
        }

        items.insert(details.key.clone(), details.client.clone());
        Ok(())
    }
}
