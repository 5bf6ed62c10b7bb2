use std::path::Path;

use fnv::FnvHashMap;
use serde::de::DeserializeOwned;

use crate::model::{Application, Blockchain, LoadBalancer, LoadBalancerRecord};
use crate::{Error, Result};

pub const BLOCKCHAINS_FILE: &str = "Blockchains.json";
pub const APPLICATIONS_FILE: &str = "Applications.json";
pub const LOAD_BALANCERS_FILE: &str = "LoadBalancers.json";

/// Source of the entities a relay request refers to.
///
/// Lookups of unknown entities return a not-found error.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    async fn application(&self, id: &str) -> Result<Application>;
    async fn blockchain(&self, alias_or_id: &str) -> Result<Blockchain>;
    async fn load_balancer(&self, id: &str) -> Result<LoadBalancer>;
}

/// Read-only repository loaded from JSON documents at startup.
#[derive(Clone, Debug, Default)]
pub struct JsonRepository {
    applications: FnvHashMap<String, Application>,
    blockchains: Vec<Blockchain>,
    load_balancers: FnvHashMap<String, LoadBalancer>,
}

impl JsonRepository {
    /// Loads blockchains, applications and load balancers from the given
    /// directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let blockchains: Vec<Blockchain> = read_json(&dir.join(BLOCKCHAINS_FILE))?;
        let applications: Vec<Application> = read_json(&dir.join(APPLICATIONS_FILE))?;
        let load_balancers: Vec<LoadBalancerRecord> = read_json(&dir.join(LOAD_BALANCERS_FILE))?;

        let repo = Self::new(applications, blockchains, load_balancers);
        info!(
            "repository loaded from {}: {} applications, {} blockchains, {} load balancers",
            dir.display(),
            repo.applications.len(),
            repo.blockchains.len(),
            repo.load_balancers.len()
        );
        Ok(repo)
    }

    /// Builds the repository, resolving load balancer application ids.
    /// Ids that don't refer to a known application are dropped.
    pub fn new(
        applications: Vec<Application>,
        blockchains: Vec<Blockchain>,
        load_balancers: Vec<LoadBalancerRecord>,
    ) -> Self {
        let applications: FnvHashMap<String, Application> = applications
            .into_iter()
            .map(|app| (app.id.clone(), app))
            .collect();

        let mut resolved = FnvHashMap::default();
        for record in load_balancers {
            let mut apps = Vec::with_capacity(record.application_ids.len());
            let mut invalid = Vec::new();
            for id in &record.application_ids {
                match applications.get(id) {
                    Some(app) => apps.push(app.clone()),
                    None => invalid.push(id.as_str()),
                }
            }
            if !invalid.is_empty() {
                warn!(
                    "load balancer {}: invalid application ids: {:?}",
                    record.id, invalid
                );
            }
            resolved.insert(
                record.id.clone(),
                LoadBalancer {
                    id: record.id,
                    name: record.name,
                    gigastake: record.gigastake,
                    gigastake_redirect: record.gigastake_redirect,
                    sticky_options: record.sticky_options,
                    applications: apps,
                },
            );
        }

        Self {
            applications,
            blockchains,
            load_balancers: resolved,
        }
    }
}

#[async_trait::async_trait]
impl Repository for JsonRepository {
    async fn application(&self, id: &str) -> Result<Application> {
        self.applications
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ApplicationNotFound(id.to_owned()))
    }

    async fn blockchain(&self, alias_or_id: &str) -> Result<Blockchain> {
        self.blockchains
            .iter()
            .find(|chain| chain.matches(alias_or_id))
            .cloned()
            .ok_or_else(|| Error::BlockchainNotFound(alias_or_id.to_lowercase()))
    }

    async fn load_balancer(&self, id: &str) -> Result<LoadBalancer> {
        self.load_balancers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::LoadBalancerNotFound(id.to_owned()))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::IoError(format!("{}: {}", path.display(), e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}
