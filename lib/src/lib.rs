//! Relay gateway core.
//!
//! Incoming RPC requests address either an application or a load balancer
//! pooling applications. The gateway resolves the session of nodes serving
//! the application on the requested chain, picks a node (keeping callers
//! sticky to the application and node that served them before where the
//! policy allows it) and relays the request to it.

// NOTE: extern crate syntax is obsolete, but still provides global macro
// imports.
#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

pub use chain_check::{ChainChecker, SupportingNodes};
pub use config::{AatPlan, Config};
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use model::{Application, Blockchain, LoadBalancer, StickyOptions};
pub use relay::{RelayOptions, RelayServer};
pub use relayer::{Aat, HttpRelayer, RelayInput, RelayOutput, Relayer};
pub use repository::{JsonRepository, Repository};
pub use session::{Dispatcher, HttpDispatcher, Node, Session, SessionCache};
pub use sticky::{StickyCache, StickyClient, StickyDetails, StickyKey};

pub mod chain_check;
pub mod config;
pub mod gateway;
pub mod model;
pub mod relay;
pub mod relayer;
pub mod repository;
pub mod session;
pub mod sticky;

#[cfg(feature = "http_server")]
pub mod server;

mod error;
