use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Enumeration of all possible errors.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("no applications found matching {0}")]
    ApplicationNotFound(String),
    #[error("no blockchains found matching {0}")]
    BlockchainNotFound(String),
    #[error("no load balancers found matching {0}")]
    LoadBalancerNotFound(String),
    #[error("load balancer {0} configuration invalid: no valid applications")]
    NoLoadBalancerApplications(String),
    #[error("session has no nodes")]
    SessionHasNoNodes,

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("relay failed: {0}")]
    RelayFailed(String),
    #[error("dispatch failed: {0}")]
    DispatchFailed(String),
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("path does not match any of the accepted paths: {0}")]
    InvalidPath(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("incorrect request method, expected: POST, got: {0}")]
    InvalidMethod(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    IoError(String),
    #[error("serde json error: {0}")]
    SerdeJsonError(String),
    #[error("toml deserialization error: {0}")]
    TomlDeserError(String),

    #[error("other: {0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::SerdeJsonError(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::TomlDeserError(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::NetworkError(e.to_string())
    }
}

#[cfg(feature = "http_server")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        (axum::http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}
