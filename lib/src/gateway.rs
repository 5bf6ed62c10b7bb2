//! Wiring of the gateway components.

use std::sync::Arc;

use crate::chain_check::ChainChecker;
use crate::config::Config;
use crate::relay::RelayServer;
use crate::relayer::{HttpRelayer, Relayer};
use crate::repository::{JsonRepository, Repository};
use crate::session::{Dispatcher, HttpDispatcher, SessionCache};
use crate::sticky::StickyCache;
use crate::Result;

/// Gateway components sharing a single session cache.
#[derive(Clone)]
pub struct Gateway {
    pub repository: Arc<dyn Repository>,
    pub relay: Arc<RelayServer>,
    pub chain_checker: Arc<ChainChecker>,
}

impl Gateway {
    pub fn new(
        config: &Config,
        repository: Arc<dyn Repository>,
        dispatcher: Arc<dyn Dispatcher>,
        relayer: Arc<dyn Relayer>,
    ) -> Self {
        let sessions = Arc::new(SessionCache::new(dispatcher, config.session.clone()));
        let sticky = Arc::new(StickyCache::new(config.sticky.clone()));
        let chain_checker = Arc::new(ChainChecker::new(
            relayer.clone(),
            sessions.clone(),
            config.aat_plan,
            &config.chain_check,
        ));
        let relay = Arc::new(RelayServer::new(
            repository.clone(),
            sessions,
            sticky,
            relayer,
            config.aat_plan,
        ));

        Self {
            repository,
            relay,
            chain_checker,
        }
    }

    /// Builds the gateway talking to the configured dispatch endpoints, with
    /// repository documents read from the data directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let repository = JsonRepository::load(&config.data_dir)?;
        let dispatcher = HttpDispatcher::new(config.dispatch_urls.clone(), config.request_timeout())?;
        let relayer = HttpRelayer::new(config.request_timeout())?;
        Ok(Self::new(
            config,
            Arc::new(repository),
            Arc::new(dispatcher),
            Arc::new(relayer),
        ))
    }
}
