//! HTTP front door accepting relay requests.
//!
//! Every request is handled by a single fallback route: the path decides
//! whether the relay goes out on behalf of an application or a load
//! balancer, the JSON body carries the chain and the payload.

mod http;

pub use http::{parse_target, router, RelayTarget, ID_LENGTH};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::relay::RelayServer;
use crate::{Error, Result};

/// Running front door.
pub struct ServerHandle {
    /// Address the server is actually bound to.
    pub listener: SocketAddr,
    pub task: JoinHandle<()>,
}

/// Binds the listener and serves relay requests until `cancel` fires.
pub fn spawn(
    listener: SocketAddr,
    relay: Arc<RelayServer>,
    cancel: CancellationToken,
) -> Result<ServerHandle> {
    let server = axum::Server::try_bind(&listener)
        .map_err(|e| Error::NetworkError(format!("failed binding {listener}: {e}")))?
        .serve(router(relay).into_make_service_with_connect_info::<SocketAddr>());
    let listener = server.local_addr();

    let task = tokio::spawn(async move {
        info!("listening for relays on {}", listener);
        let server = server.with_graceful_shutdown(async move { cancel.cancelled().await });
        if let Err(e) = server.await {
            error!("relay server failed: {}", e);
        }
        debug!("relay server on {} shut down", listener);
    });

    Ok(ServerHandle { listener, task })
}
