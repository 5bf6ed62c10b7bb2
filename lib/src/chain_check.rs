//! Verification of the chains nodes claim to serve.
//!
//! Every node of a chain's session is sent the chain's identity probe and is
//! kept only if it answers with the chain's declared identity. Chains and
//! nodes are probed concurrently, with the number of probes in flight bounded
//! by a semaphore shared across the whole check.

use std::sync::Arc;

use fnv::FnvHashMap;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::{AatPlan, ChainCheckConfig};
use crate::model::{Application, Blockchain};
use crate::relay::RELAY_METHOD;
use crate::relayer::{Aat, RelayInput, Relayer};
use crate::session::{Node, Session, SessionCache};
use crate::Result;

/// Nodes verified to support a chain, keyed by session key.
pub type SupportingNodes = FnvHashMap<String, Vec<Node>>;

pub struct ChainChecker {
    relayer: Arc<dyn Relayer>,
    sessions: Arc<SessionCache>,
    aat_plan: AatPlan,
    max_in_flight: usize,
}

impl ChainChecker {
    pub fn new(
        relayer: Arc<dyn Relayer>,
        sessions: Arc<SessionCache>,
        aat_plan: AatPlan,
        config: &ChainCheckConfig,
    ) -> Self {
        Self {
            relayer,
            sessions,
            aat_plan,
            max_in_flight: config.max_in_flight.max(1),
        }
    }

    /// Checks which nodes of the application's sessions support each of the
    /// given chains.
    ///
    /// Chains whose session can't be retrieved and nodes that fail to answer
    /// are left out of the result rather than failing the call. Once `cancel`
    /// fires, probes that haven't completed are dropped.
    pub async fn nodes_supporting_app(
        &self,
        cancel: &CancellationToken,
        application: &Application,
        chains: &[Blockchain],
    ) -> Result<SupportingNodes> {
        let aat = Aat::from_application(application, self.aat_plan);
        let limit = Arc::new(Semaphore::new(self.max_in_flight));

        let (sender, mut receiver) = mpsc::channel::<(String, Vec<Node>)>(chains.len().max(1));
        for chain in chains {
            let sender = sender.clone();
            let sessions = self.sessions.clone();
            let relayer = self.relayer.clone();
            let limit = limit.clone();
            let cancel = cancel.clone();
            let aat = aat.clone();
            let chain = chain.clone();
            let app_id = application.id.clone();

            tokio::spawn(async move {
                let session = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    session = sessions.session(&aat.app_pub_key, &chain.id) => session,
                };
                let session = match session {
                    Ok(session) => session,
                    Err(e) => {
                        warn!(
                            "chain check: application {}: failed getting session for chain {}: {}",
                            app_id, chain.id, e
                        );
                        return;
                    }
                };

                let nodes =
                    nodes_supporting_chain(relayer, limit, cancel, aat, chain, session.clone())
                        .await;
                let _ = sender.send((session.key.clone(), nodes)).await;
            });
        }
        // Only the spawned tasks hold senders now, the loop below ends once
        // all of them are done.
        drop(sender);

        let mut results = SupportingNodes::default();
        while let Some((key, nodes)) = receiver.recv().await {
            results.insert(key, nodes);
        }

        if cancel.is_cancelled() {
            debug!(
                "chain check for application {} cancelled, {} sessions checked",
                application.id,
                results.len()
            );
        }
        Ok(results)
    }
}

/// Probes every node of the session concurrently and returns those
/// answering with the chain's identity.
async fn nodes_supporting_chain(
    relayer: Arc<dyn Relayer>,
    limit: Arc<Semaphore>,
    cancel: CancellationToken,
    aat: Aat,
    chain: Blockchain,
    session: Arc<Session>,
) -> Vec<Node> {
    let (sender, mut receiver) = mpsc::channel::<Option<Node>>(session.nodes.len().max(1));
    for node in &session.nodes {
        let sender = sender.clone();
        let relayer = relayer.clone();
        let limit = limit.clone();
        let cancel = cancel.clone();
        let input = RelayInput {
            method: RELAY_METHOD.to_owned(),
            blockchain: chain.id.clone(),
            data: chain.chain_id_check.clone(),
            path: chain.path.clone(),
            aat: aat.clone(),
            session: session.clone(),
            node: node.clone(),
        };
        let expected = chain.chain_id.clone();

        tokio::spawn(async move {
            let supported = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                supported = probe(relayer, limit, input, &expected) => Some(supported),
            };
            let _ = sender.send(supported.flatten()).await;
        });
    }
    drop(sender);

    let mut supporting = Vec::new();
    while let Some(node) = receiver.recv().await {
        if let Some(node) = node {
            supporting.push(node);
        }
    }
    supporting
}

async fn probe(
    relayer: Arc<dyn Relayer>,
    limit: Arc<Semaphore>,
    input: RelayInput,
    expected: &str,
) -> Option<Node> {
    let _permit = limit.acquire_owned().await.ok()?;
    let node = input.node.clone();
    match relayer.relay(input).await {
        Ok(output) if output.response == expected => Some(node),
        Ok(output) => {
            debug!(
                "node {} answered chain identity {:?}, expected {:?}",
                node.address, output.response, expected
            );
            None
        }
        Err(e) => {
            warn!("node {} failed the chain identity probe: {}", node.address, e);
            None
        }
    }
}
