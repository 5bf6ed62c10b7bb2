//! Relay dispatch.
//!
//! Resolves what a relay request refers to, picks the serving application
//! and node (honoring sticky affinity where the policy allows it), sends the
//! relay and reports the outcome back to the affinity cache.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::AatPlan;
use crate::model::{Application, Blockchain, LoadBalancer, StickyOptions};
use crate::relayer::{Aat, RelayInput, RelayOutput, Relayer};
use crate::repository::Repository;
use crate::session::SessionCache;
use crate::sticky::{StickyCache, StickyDetails, StickyKey};
use crate::{Error, Result};

/// Method relays are sent with unless the request names one.
pub const RELAY_METHOD: &str = "POST";

/// Parameters of a single inbound relay request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RelayOptions {
    /// Value of the request's `Origin` header.
    pub origin: String,
    /// Relay method, [`RELAY_METHOD`] when empty.
    pub method: String,
    pub raw_data: String,
    /// Address of the caller.
    pub ip: String,
    /// Relay sub-path forwarded to the node.
    pub path: String,
    pub request_id: Uuid,
    /// Blockchain alias or id.
    pub blockchain_id: String,
    /// JSON-RPC id of the payload. Only identifies sticky callers reaching
    /// the gateway without an application or load balancer.
    pub rpc_id: i64,
    pub application_id: String,
    pub load_balancer_id: String,
}

/// Everything resolved for one in-flight relay.
#[derive(Clone, Debug)]
pub struct RelayDetails {
    pub blockchain: Blockchain,
    pub application: Application,
    pub load_balancer: Option<LoadBalancer>,
    pub options: RelayOptions,
    pub sticky: StickyDetails,
}

/// Entry point for relays on behalf of applications and load balancers.
#[derive(Clone)]
pub struct RelayServer {
    repository: Arc<dyn Repository>,
    sessions: Arc<SessionCache>,
    sticky: Arc<StickyCache>,
    relayer: Arc<dyn Relayer>,
    aat_plan: AatPlan,
}

impl RelayServer {
    pub fn new(
        repository: Arc<dyn Repository>,
        sessions: Arc<SessionCache>,
        sticky: Arc<StickyCache>,
        relayer: Arc<dyn Relayer>,
        aat_plan: AatPlan,
    ) -> Self {
        Self {
            repository,
            sessions,
            sticky,
            relayer,
            aat_plan,
        }
    }

    pub fn sticky(&self) -> &Arc<StickyCache> {
        &self.sticky
    }

    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// Relays on behalf of the application referenced by the options.
    pub async fn relay_with_app(&self, options: RelayOptions) -> Result<()> {
        let resolved = tokio::try_join!(
            self.repository.application(&options.application_id),
            self.repository.blockchain(&options.blockchain_id),
        );
        let (application, blockchain) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("request {}: failed resolving relay details: {}", options.request_id, e);
                return Err(e);
            }
        };

        self.dispatch(RelayDetails {
            blockchain,
            application,
            load_balancer: None,
            options,
            sticky: StickyDetails::default(),
        })
        .await
    }

    /// Relays through one of the applications pooled by the load balancer
    /// referenced by the options.
    pub async fn relay_with_lb(&self, options: RelayOptions) -> Result<()> {
        let resolved = tokio::try_join!(
            self.repository.blockchain(&options.blockchain_id),
            self.repository.load_balancer(&options.load_balancer_id),
        );
        let (blockchain, load_balancer) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("request {}: failed resolving relay details: {}", options.request_id, e);
                return Err(e);
            }
        };

        if load_balancer.gigastake_redirect {
            warn!(
                "request {}: gigastake redirect requested by load balancer {}",
                options.request_id, load_balancer.id
            );
            return Err(Error::NotImplemented(format!(
                "gigastake redirect for load balancer {}",
                load_balancer.id
            )));
        }

        let mut sticky = self.sticky.details(
            &load_balancer.sticky_options,
            |_| sticky_key(&options, &blockchain, &load_balancer),
            |sticky_options| verify_origin(sticky_options, &options.origin),
        );

        let application =
            match select_application(&load_balancer, &sticky.client.preferred_application_id) {
                Ok(app) => app.clone(),
                Err(e) => {
                    warn!("request {}: {}", options.request_id, e);
                    return Err(e);
                }
            };
        if sticky.client.is_empty() {
            sticky.client.preferred_application_id = application.id.clone();
        }
        debug!(
            "request {}: load balancer {} selected application {}",
            options.request_id, load_balancer.id, application.id
        );

        self.dispatch(RelayDetails {
            blockchain,
            application,
            load_balancer: Some(load_balancer),
            options,
            sticky,
        })
        .await
    }

    async fn dispatch(&self, mut details: RelayDetails) -> Result<()> {
        let request_id = details.options.request_id;
        let aat = Aat::from_application(&details.application, self.aat_plan);

        let session = match self
            .sessions
            .session(&aat.app_pub_key, &details.blockchain.id)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.record_failure(&mut details.sticky, request_id);
                return Err(e);
            }
        };

        let node = session
            .node(&details.sticky.client.preferred_node_address)
            .or_else(|| session.first_node())
            .cloned()
            .ok_or_else(|| {
                warn!("request {}: session {} has no nodes", request_id, session.key);
                Error::SessionHasNoNodes
            })?;

        let client = &mut details.sticky.client;
        if client.preferred_application_id.is_empty() {
            client.preferred_application_id = details.application.id.clone();
        }
        if client.preferred_node_address.is_empty() {
            client.preferred_node_address = node.address.clone();
        }

        info!(
            "request {}: sending relay for application {} on chain {} to node {}",
            request_id, details.application.id, details.blockchain.id, node.address
        );

        let method = match details.options.method.as_str() {
            "" => RELAY_METHOD.to_owned(),
            method => method.to_owned(),
        };
        let input = RelayInput {
            method,
            blockchain: details.blockchain.id.clone(),
            data: details.options.raw_data.clone(),
            path: details.options.path.clone(),
            aat,
            session,
            node,
        };

        match self.relayer.relay(input).await {
            Ok(output) => {
                if let Err(e) = self.sticky.success(&mut details.sticky) {
                    warn!("request {}: failed recording sticky success: {}", request_id, e);
                }
                debug!("request {}: received relay response", request_id);
                parse_relay_response(&output)
            }
            Err(e) => {
                info!("request {}: relay failed: {}", request_id, e);
                self.record_failure(&mut details.sticky, request_id);
                Err(e)
            }
        }
    }

    fn record_failure(&self, sticky: &mut StickyDetails, request_id: Uuid) {
        if let Err(e) = self.sticky.failure(sticky) {
            warn!("request {}: failed recording sticky failure: {}", request_id, e);
        }
    }
}

/// Picks the load balancer application to relay through: the preferred one
/// if it's still in the pool, a random one otherwise.
fn select_application<'a>(lb: &'a LoadBalancer, preferred: &str) -> Result<&'a Application> {
    if lb.applications.is_empty() {
        return Err(Error::NoLoadBalancerApplications(lb.id.clone()));
    }
    if let Some(app) = lb.application(preferred) {
        return Ok(app);
    }
    Ok(&lb.applications[rand::random_range(0..lb.applications.len())])
}

fn sticky_key(options: &RelayOptions, blockchain: &Blockchain, lb: &LoadBalancer) -> StickyKey {
    StickyKey::new(options.rpc_id, &lb.id, "", &blockchain.id, &options.ip)
}

/// Callers may reach the gateway from several origins, not all of which
/// allow stickiness. Affinity saved for one origin is only honored for
/// origins the policy lists.
fn verify_origin(options: &StickyOptions, origin: &str) -> Result<()> {
    if options.allows_origin(origin) {
        Ok(())
    } else {
        Err(Error::Other(format!(
            "origin {origin:?} does not match sticky origins"
        )))
    }
}

// TODO: validate the node response shape once relays carry per-chain
// response expectations.
fn parse_relay_response(_output: &RelayOutput) -> Result<()> {
    Ok(())
}
