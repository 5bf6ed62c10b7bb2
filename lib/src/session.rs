//! Sessions of serving nodes and the cache in front of the dispatch service.

use std::sync::Arc;
use std::time::Duration;

use fnv::FnvHashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::SessionCacheConfig;
use crate::{Error, Result};

pub const DISPATCH_ENDPOINT: &str = "/v1/client/dispatch";

/// Node eligible to serve relays within a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub address: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub service_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub app_public_key: String,
    pub chain: String,
    #[serde(default)]
    pub session_height: u64,
}

/// Set of nodes currently eligible to serve an application on a chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    #[serde(default)]
    pub header: SessionHeader,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Session {
    pub fn node(&self, address: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.address == address)
    }

    pub fn first_node(&self) -> Option<&Node> {
        self.nodes.first()
    }
}

/// Session discovery service.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, public_key: &str, blockchain_id: &str) -> Result<Session>;
}

#[derive(Serialize)]
struct DispatchRequest<'a> {
    app_public_key: &'a str,
    chain: &'a str,
    session_height: u64,
}

#[derive(Deserialize)]
struct DispatchResponse {
    session: Session,
}

/// Dispatcher calling the dispatch endpoint of the configured urls, in order,
/// until one of them answers.
#[derive(Clone, Debug)]
pub struct HttpDispatcher {
    urls: Vec<String>,
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::InvalidConfig("no dispatch urls provided".to_owned()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { urls, client })
    }

    async fn dispatch_at(&self, url: &str, request: &DispatchRequest<'_>) -> Result<Session> {
        let url = format!("{}{}", url.trim_end_matches('/'), DISPATCH_ENDPOINT);
        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::DispatchFailed(format!("{url} responded with {status}")));
        }
        let response: DispatchResponse = response.json().await?;
        Ok(response.session)
    }
}

#[async_trait::async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, public_key: &str, blockchain_id: &str) -> Result<Session> {
        let request = DispatchRequest {
            app_public_key: public_key,
            chain: blockchain_id,
            session_height: 0,
        };

        let mut last_error = None;
        for url in &self.urls {
            match self.dispatch_at(url, &request).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    debug!("dispatch at {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::DispatchFailed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no dispatch urls".to_owned()),
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub public_key: String,
    pub blockchain_id: String,
}

#[derive(Clone, Debug)]
pub struct SessionCacheEntry {
    pub session: Arc<Session>,
    pub expires_at: Instant,
}

impl SessionCacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache of dispatched sessions keyed by application public key and chain.
///
/// Entries are replaced once their ttl elapses. A failed dispatch leaves the
/// cache untouched. The number of entries is bounded: inserting past the
/// bound sweeps expired entries first and then drops the entry closest to
/// expiry.
pub struct SessionCache {
    dispatcher: Arc<dyn Dispatcher>,
    config: SessionCacheConfig,
    entries: Mutex<FnvHashMap<SessionKey, SessionCacheEntry>>,
}

impl SessionCache {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, config: SessionCacheConfig) -> Self {
        Self {
            dispatcher,
            config,
            entries: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Returns the current session of the application on the chain,
    /// dispatching a new one if there's no live cached entry.
    pub async fn session(&self, public_key: &str, blockchain_id: &str) -> Result<Arc<Session>> {
        let key = SessionKey {
            public_key: public_key.to_owned(),
            blockchain_id: blockchain_id.to_owned(),
        };

        let cached = {
            let entries = self.entries.lock();
            entries
                .get(&key)
                .filter(|entry| !entry.is_expired(Instant::now()))
                .map(|entry| entry.session.clone())
        };
        if let Some(session) = cached {
            return Ok(session);
        }

        let session = match self.dispatcher.dispatch(public_key, blockchain_id).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                warn!(
                    "failed dispatching session for {} on chain {}: {}",
                    public_key, blockchain_id, e
                );
                return Err(e);
            }
        };
        debug!(
            "dispatched session {} with {} nodes for chain {}",
            session.key,
            session.nodes.len(),
            blockchain_id
        );

        let now = Instant::now();
        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            evict(&mut entries, now);
        }
        entries.insert(
            key,
            SessionCacheEntry {
                session: session.clone(),
                expires_at: now + self.config.ttl(),
            },
        );

        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn evict(entries: &mut FnvHashMap<SessionKey, SessionCacheEntry>, now: Instant) {
    entries.retain(|_, entry| !entry.is_expired(now));
    if entries.is_empty() {
        return;
    }
    // Still full of live sessions, drop the one closest to expiry.
    if let Some(key) = entries
        .iter()
        .min_by_key(|(_, entry)| entry.expires_at)
        .map(|(key, _)| key.clone())
    {
        trace!("evicting session cache entry {:?}", key);
        entries.remove(&key);
    }
}
