use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, Method, Uri};
use axum::{Extension, Router};
use uuid::Uuid;

use crate::relay::{RelayOptions, RelayServer};
use crate::{Error, Result};

/// Length of application and load balancer identifiers. Anything past it is
/// either ignored or, when introduced by `~`, carries the relay path.
pub const ID_LENGTH: usize = 24;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// What a relay request path addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayTarget {
    Application { id: String, path: String },
    LoadBalancer { id: String, path: String },
}

#[derive(Debug, Deserialize)]
struct RelayRequestBody {
    #[serde(rename = "blockchainID")]
    blockchain_id: String,
    #[serde(default, rename = "rawData")]
    raw_data: serde_json::Value,
}

pub fn router(relay: Arc<RelayServer>) -> Router {
    Router::new()
        .fallback(relay_handler)
        .layer(Extension(relay))
}

async fn relay_handler(
    Extension(relay): Extension<Arc<RelayServer>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str> {
    if method != Method::POST {
        return Err(Error::InvalidMethod(method.to_string()));
    }

    let target = parse_target(uri.path())?;
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    let options = relay_options(&target, peer, &headers, &body)?;
    debug!(
        "request {}: relay for chain {} from {}",
        options.request_id, options.blockchain_id, options.ip
    );

    let request_id = options.request_id;
    let result = match target {
        RelayTarget::Application { .. } => relay.relay_with_app(options).await,
        RelayTarget::LoadBalancer { .. } => relay.relay_with_lb(options).await,
    };
    if let Err(e) = result {
        info!("request {}: relay not sent: {}", request_id, e);
        return Err(e);
    }

    Ok("relay sent")
}

/// Parses the relay target out of a request path.
///
/// Accepted paths end in `v1/<id>` or `v1/lb/<id>` (`lb` in either case).
/// Ids longer than [`ID_LENGTH`] are truncated; if the character right after
/// the id is `~`, the remainder becomes the relay path with every `~`
/// standing for `/`.
pub fn parse_target(path: &str) -> Result<RelayTarget> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let v1 = segments
        .iter()
        .rposition(|segment| *segment == "v1")
        .ok_or_else(|| Error::InvalidPath(path.to_owned()))?;

    match &segments[v1 + 1..] {
        [id] if is_valid_id(id) => {
            let (id, path) = split_id(id);
            Ok(RelayTarget::Application { id, path })
        }
        [lb, id] if lb.eq_ignore_ascii_case("lb") && is_valid_id(id) => {
            let (id, path) = split_id(id);
            Ok(RelayTarget::LoadBalancer { id, path })
        }
        _ => Err(Error::InvalidPath(path.to_owned())),
    }
}

fn is_valid_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'~'))
        }
        _ => false,
    }
}

/// Splits a validated, ascii-only id into the id proper and the relay path.
fn split_id(id: &str) -> (String, String) {
    if id.len() <= ID_LENGTH {
        return (id.to_owned(), String::new());
    }
    let path = if id.as_bytes()[ID_LENGTH] == b'~' {
        id[ID_LENGTH..].replace('~', "/")
    } else {
        String::new()
    };
    (id[..ID_LENGTH].to_owned(), path)
}

fn relay_options(
    target: &RelayTarget,
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<RelayOptions> {
    let body: RelayRequestBody =
        serde_json::from_slice(body).map_err(|e| Error::InvalidRequest(e.to_string()))?;
    if body.blockchain_id.is_empty() {
        return Err(Error::InvalidRequest("missing blockchainID".to_owned()));
    }

    let ip = header(headers, X_FORWARDED_FOR)
        .split(',')
        .map(str::trim)
        .find(|ip| !ip.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default();

    let mut options = RelayOptions {
        origin: header(headers, ORIGIN.as_str()).to_owned(),
        method: Method::POST.to_string(),
        raw_data: serde_json::to_string(&body.raw_data)?,
        ip,
        request_id: Uuid::new_v4(),
        rpc_id: body
            .raw_data
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_default(),
        blockchain_id: body.blockchain_id,
        ..Default::default()
    };

    match target {
        RelayTarget::Application { id, path } => {
            options.application_id = id.clone();
            options.path = path.clone();
        }
        RelayTarget::LoadBalancer { id, path } => {
            options.load_balancer_id = id.clone();
            options.path = path.clone();
        }
    }

    Ok(options)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
