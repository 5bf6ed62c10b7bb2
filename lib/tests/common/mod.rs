use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use relaygate::model::{GatewayAat, LoadBalancerRecord};
use relaygate::{
    Application, Blockchain, Config, Dispatcher, Error, Gateway, JsonRepository, Node,
    RelayInput, RelayOptions, RelayOutput, Relayer, Result, Session, StickyOptions,
};

pub const ETH: &str = "0021";
pub const POLY: &str = "0009";
pub const POKT: &str = "0001";

/// Load balancer id of full length, leaving room for an embedded relay path.
pub const LONG_LB: &str = "lb-0123456789abcdefghijk";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn node(address: &str) -> Node {
    Node {
        address: address.to_owned(),
        public_key: format!("{address}-pub"),
        service_url: format!("http://{address}.local:8081"),
    }
}

pub fn application(id: &str) -> Application {
    Application {
        id: id.to_owned(),
        name: format!("{id} name"),
        gateway_aat: GatewayAat {
            application_public_key: format!("pub-{id}"),
            application_signature: format!("sig-{id}"),
            client_public_key: "gateway-client-pub".to_owned(),
            version: "0.0.1".to_owned(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn blockchains() -> Vec<Blockchain> {
    vec![
        Blockchain {
            id: ETH.to_owned(),
            aliases: vec!["eth-mainnet".to_owned()],
            chain_id: "1".to_owned(),
            chain_id_check: r#"{"method":"eth_chainId","id":1,"jsonrpc":"2.0"}"#.to_owned(),
            ticker: "ETH".to_owned(),
            active: true,
            ..Default::default()
        },
        Blockchain {
            id: POLY.to_owned(),
            aliases: vec!["poly-mainnet".to_owned()],
            chain_id: "137".to_owned(),
            chain_id_check: r#"{"method":"eth_chainId","id":1,"jsonrpc":"2.0"}"#.to_owned(),
            ticker: "POLY".to_owned(),
            active: true,
            ..Default::default()
        },
        Blockchain {
            id: POKT.to_owned(),
            aliases: vec!["mainnet".to_owned()],
            chain_id: "mainnet".to_owned(),
            path: "/v1/query/height".to_owned(),
            ticker: "POKT".to_owned(),
            active: true,
            ..Default::default()
        },
    ]
}

pub fn sticky_options() -> StickyOptions {
    StickyOptions {
        stickiness: true,
        duration: 60,
        sticky_max: 100,
        sticky_origins: vec!["example.org".to_owned()],
    }
}

/// Repository with three applications and a handful of load balancers:
///
/// - `lb-sticky` pools all applications and keeps callers from
///   `example.org` sticky
/// - `lb-plain` pools two applications without stickiness
/// - `lb-giga` asks for a gigastake redirect
/// - `lb-empty` only refers to unknown applications
/// - [`LONG_LB`] pools a single application
pub fn repository() -> JsonRepository {
    let ids = |ids: &[&str]| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
    JsonRepository::new(
        vec![application("app-1"), application("app-2"), application("app-3")],
        blockchains(),
        vec![
            LoadBalancerRecord {
                id: "lb-sticky".to_owned(),
                application_ids: ids(&["app-1", "app-2", "app-3"]),
                sticky_options: sticky_options(),
                ..Default::default()
            },
            LoadBalancerRecord {
                id: "lb-plain".to_owned(),
                application_ids: ids(&["app-1", "app-2"]),
                ..Default::default()
            },
            LoadBalancerRecord {
                id: "lb-giga".to_owned(),
                application_ids: ids(&["app-1"]),
                gigastake: true,
                gigastake_redirect: true,
                ..Default::default()
            },
            LoadBalancerRecord {
                id: "lb-empty".to_owned(),
                application_ids: ids(&["ghost"]),
                ..Default::default()
            },
            LoadBalancerRecord {
                id: LONG_LB.to_owned(),
                application_ids: ids(&["app-2"]),
                ..Default::default()
            },
        ],
    )
}

/// Dispatcher handing out sessions made of a configurable node list.
#[derive(Default)]
pub struct FakeDispatcher {
    pub nodes: Mutex<Vec<Node>>,
    /// Chains the dispatcher fails for.
    pub failing_chains: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeDispatcher {
    pub fn with_nodes(addresses: &[&str]) -> Self {
        let dispatcher = Self::default();
        dispatcher.set_nodes(addresses);
        dispatcher
    }

    pub fn set_nodes(&self, addresses: &[&str]) {
        *self.nodes.lock() = addresses.iter().map(|address| node(address)).collect();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Dispatcher for FakeDispatcher {
    async fn dispatch(&self, public_key: &str, blockchain_id: &str) -> Result<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_chains.lock().iter().any(|c| c == blockchain_id) {
            return Err(Error::DispatchFailed(format!("no session for {blockchain_id}")));
        }
        Ok(Session {
            key: format!("{public_key}-{blockchain_id}"),
            nodes: self.nodes.lock().clone(),
            ..Default::default()
        })
    }
}

type Responder = dyn Fn(&RelayInput) -> Result<RelayOutput> + Send + Sync;

/// Relayer recording every relay it's handed and answering through a
/// configurable responder.
pub struct FakeRelayer {
    pub inputs: Mutex<Vec<RelayInput>>,
    responder: Box<Responder>,
    delay: Option<std::time::Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Default for FakeRelayer {
    fn default() -> Self {
        Self::responding(|_| {
            Ok(RelayOutput {
                response: r#"{"id":1,"jsonrpc":"2.0","result":"0x1"}"#.to_owned(),
                signature: "sig".to_owned(),
            })
        })
    }
}

impl FakeRelayer {
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&RelayInput) -> Result<RelayOutput> + Send + Sync + 'static,
    {
        Self {
            inputs: Mutex::new(Vec::new()),
            responder: Box::new(responder),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::responding(|input| {
            Err(Error::RelayFailed(format!(
                "node {} unreachable",
                input.node.address
            )))
        })
    }

    /// Answers identity probes with the identity of the probed chain, except
    /// for the listed nodes which answer with a bogus one.
    pub fn identities(liars: &[&str]) -> Self {
        let chains = blockchains();
        let liars: Vec<String> = liars.iter().map(|l| l.to_string()).collect();
        Self::responding(move |input| {
            let response = if liars.contains(&input.node.address) {
                "bogus".to_owned()
            } else {
                chains
                    .iter()
                    .find(|chain| chain.id == input.blockchain)
                    .map(|chain| chain.chain_id.clone())
                    .unwrap_or_default()
            };
            Ok(RelayOutput {
                response,
                ..Default::default()
            })
        })
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn inputs(&self) -> Vec<RelayInput> {
        self.inputs.lock().clone()
    }

    pub fn last(&self) -> RelayInput {
        self.inputs.lock().last().cloned().expect("no relays sent")
    }
}

#[async_trait::async_trait]
impl Relayer for FakeRelayer {
    async fn relay(&self, input: RelayInput) -> Result<RelayOutput> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let output = (self.responder)(&input);
        self.inputs.lock().push(input);
        output
    }
}

pub struct TestGateway {
    pub gateway: Gateway,
    pub dispatcher: Arc<FakeDispatcher>,
    pub relayer: Arc<FakeRelayer>,
}

pub fn gateway(config: &Config, dispatcher: FakeDispatcher, relayer: FakeRelayer) -> TestGateway {
    let dispatcher = Arc::new(dispatcher);
    let relayer = Arc::new(relayer);
    let gateway = Gateway::new(
        config,
        Arc::new(repository()),
        dispatcher.clone(),
        relayer.clone(),
    );
    TestGateway {
        gateway,
        dispatcher,
        relayer,
    }
}

pub fn app_options(application_id: &str, blockchain: &str) -> RelayOptions {
    RelayOptions {
        application_id: application_id.to_owned(),
        blockchain_id: blockchain.to_owned(),
        method: "POST".to_owned(),
        raw_data: r#"{"method":"eth_blockNumber","id":1,"jsonrpc":"2.0"}"#.to_owned(),
        ip: "10.0.0.1".to_owned(),
        request_id: uuid::Uuid::new_v4(),
        ..Default::default()
    }
}

pub fn lb_options(load_balancer_id: &str, blockchain: &str, origin: &str) -> RelayOptions {
    RelayOptions {
        load_balancer_id: load_balancer_id.to_owned(),
        application_id: String::new(),
        origin: origin.to_owned(),
        ..app_options("", blockchain)
    }
}
