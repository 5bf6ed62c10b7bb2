//! Entities resolved through the [`Repository`](crate::Repository).
//!
//! Field names follow the camel-cased JSON documents the gateway data is
//! stored in.

/// Client application registered with the gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(rename = "gatewayAAT", default)]
    pub gateway_aat: GatewayAat,
}

/// Credentials the gateway uses to build the authorization token of an
/// application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAat {
    #[serde(default)]
    pub address: String,
    pub application_public_key: String,
    #[serde(default)]
    pub application_signature: String,
    #[serde(default)]
    pub client_public_key: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blockchain {
    /// Relay chain identifier used when dispatching sessions and relays.
    pub id: String,
    #[serde(rename = "blockchainAliases", default)]
    pub aliases: Vec<String>,
    /// Identity a node is expected to answer the identity probe with.
    #[serde(rename = "chainID", default)]
    pub chain_id: String,
    /// Payload of the identity probe.
    #[serde(rename = "chainIDCheck", default)]
    pub chain_id_check: String,
    /// Relay path of the identity probe.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub active: bool,
}

impl Blockchain {
    /// Case-insensitive match against the chain's aliases and its id.
    pub fn matches(&self, alias_or_id: &str) -> bool {
        self.id.eq_ignore_ascii_case(alias_or_id)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(alias_or_id))
    }
}

/// Stickiness policy, either attached to a load balancer or configured as
/// the gateway-wide default.
///
/// `duration` and `sticky_max` are carried for reporting only. Counter
/// windows and limits come from the gateway's [`StickySettings`].
///
/// [`StickySettings`]: crate::config::StickySettings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyOptions {
    #[serde(default)]
    pub stickiness: bool,
    /// Duration of the preference in seconds.
    #[serde(default)]
    pub duration: u64,
    /// Maximum number of relays the preference is honored for.
    #[serde(default)]
    pub sticky_max: u32,
    /// Origins for which stickiness is honored, matched as case-insensitive
    /// substrings of the request origin.
    #[serde(default)]
    pub sticky_origins: Vec<String>,
}

impl StickyOptions {
    /// Policy without stickiness or without any sticky origin is empty and
    /// disables stickiness.
    pub fn is_empty(&self) -> bool {
        !self.stickiness || self.sticky_origins.is_empty()
    }

    /// Checks the request origin against the allowed sticky origins.
    pub fn allows_origin(&self, origin: &str) -> bool {
        let origin = origin.to_lowercase();
        self.sticky_origins
            .iter()
            .any(|sticky| origin.contains(&sticky.to_lowercase()))
    }
}

/// Load balancer as stored, with unverified application ids.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "applicationIDs", default)]
    pub application_ids: Vec<String>,
    #[serde(default)]
    pub gigastake: bool,
    #[serde(default)]
    pub gigastake_redirect: bool,
    #[serde(rename = "stickinessOptions", default)]
    pub sticky_options: StickyOptions,
}

/// Load balancer with its application pool resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub gigastake: bool,
    /// Redirect mode spreading traffic to gigastake applications. Not
    /// supported yet.
    pub gigastake_redirect: bool,
    pub sticky_options: StickyOptions,
    pub applications: Vec<Application>,
}

impl LoadBalancer {
    pub fn application(&self, id: &str) -> Option<&Application> {
        self.applications.iter().find(|app| app.id == id)
    }
}
