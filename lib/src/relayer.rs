//! Relay transport seam.
//!
//! The gateway hands fully resolved relays to a [`Relayer`]. Signing and the
//! exact wire format are the relayer's concern; [`HttpRelayer`] is a plain
//! JSON-over-HTTP binding posting to the node's service URL.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AatPlan;
use crate::model::Application;
use crate::session::{Node, Session};
use crate::{Error, Result};

pub const RELAY_ENDPOINT: &str = "/v1/client/relay";

/// Authorization token proving the gateway relays on behalf of an
/// application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aat {
    pub version: String,
    pub app_pub_key: String,
    pub client_pub_key: String,
    pub signature: String,
}

impl Aat {
    /// Builds the token from the application's gateway credentials.
    ///
    /// Both plans currently draw on the gateway AAT.
    pub fn from_application(app: &Application, plan: AatPlan) -> Self {
        let aat = &app.gateway_aat;
        match plan {
            AatPlan::Freemium | AatPlan::Premium => Self {
                version: aat.version.clone(),
                app_pub_key: aat.application_public_key.clone(),
                client_pub_key: aat.client_public_key.clone(),
                signature: aat.application_signature.clone(),
            },
        }
    }
}

/// Single relay addressed to one node of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayInput {
    pub method: String,
    /// Relay chain identifier.
    pub blockchain: String,
    pub data: String,
    pub path: String,
    pub aat: Aat,
    pub session: Arc<Session>,
    pub node: Node,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayOutput {
    /// Raw payload returned by the node.
    pub response: String,
    #[serde(default)]
    pub signature: String,
}

#[async_trait::async_trait]
pub trait Relayer: Send + Sync {
    async fn relay(&self, input: RelayInput) -> Result<RelayOutput>;
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    payload: RelayPayload<'a>,
    chain: &'a str,
    aat: &'a Aat,
    session_key: &'a str,
    servicer_pub_key: &'a str,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    data: &'a str,
    method: &'a str,
    path: &'a str,
}

/// Relayer posting JSON relays to the node's own service URL.
#[derive(Clone, Debug)]
pub struct HttpRelayer {
    client: reqwest::Client,
}

impl HttpRelayer {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Relayer for HttpRelayer {
    async fn relay(&self, input: RelayInput) -> Result<RelayOutput> {
        let url = format!(
            "{}{}",
            input.node.service_url.trim_end_matches('/'),
            RELAY_ENDPOINT
        );
        let request = RelayRequest {
            payload: RelayPayload {
                data: &input.data,
                method: &input.method,
                path: &input.path,
            },
            chain: &input.blockchain,
            aat: &input.aat,
            session_key: &input.session.key,
            servicer_pub_key: &input.node.public_key,
        };
        trace!("posting relay to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::RelayFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RelayFailed(format!(
                "node {} responded with {}: {}",
                input.node.address, status, body
            )));
        }

        response
            .json::<RelayOutput>()
            .await
            .map_err(|e| Error::RelayFailed(e.to_string()))
    }
}
