//! Backend forwarding.
//!
//! Every cache miss is sent to the single configured backend. The response
//! body is returned as a stream; the proxy decides whether to buffer it.

use std::{num::NonZeroUsize, time::Duration};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, Response, Uri, header, uri::InvalidUri},
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::config::BackendSettings;

use super::error::InfraError;

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: [header::HeaderName; 8] = [
    header::CONNECTION,
    header::HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to read client request body: {0}")]
    RequestBody(String),
    #[error("invalid backend target `{target}`")]
    Target {
        target: String,
        #[source]
        source: InvalidUri,
    },
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("backend request failed")]
    Transport(#[source] hyper_util::client::legacy::Error),
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `request` to the backend and return its response head with a
    /// streaming body.
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError>;
}

type BackendClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// [`Upstream`] backed by a pooled hyper client.
///
/// The response head buffer is sized like the inbound one, so a backend can
/// send `clear-keys` headers as large as clients may send requests.
#[derive(Debug, Clone)]
pub struct HyperUpstream {
    client: BackendClient,
    base: String,
    timeout: Option<Duration>,
}

impl HyperUpstream {
    pub fn new(settings: &BackendSettings, max_header_bytes: NonZeroUsize) -> Result<Self, InfraError> {
        let connector = HttpsConnectorBuilder::new()
            .try_with_platform_verifier()
            .map_err(|err| {
                InfraError::configuration(format!("failed to initialize TLS verifier: {err}"))
            })?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .http1_max_buf_size(max_header_bytes.get())
            .build(connector);

        Ok(Self {
            client,
            base: settings.url.as_str().trim_end_matches('/').to_string(),
            timeout: settings.timeout,
        })
    }

    /// Backend URL for an inbound request target; the target's path is
    /// appended to the backend's base path.
    pub fn target(&self, uri: &Uri) -> String {
        let path_and_query = uri
            .path_and_query()
            .map(|value| value.as_str())
            .unwrap_or("/");
        format!("{}{}", self.base, path_and_query)
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let (parts, body) = request.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|err| UpstreamError::RequestBody(err.to_string()))?
            .to_bytes();

        let target = self.target(&parts.uri);
        let uri: Uri = target
            .parse()
            .map_err(|source| UpstreamError::Target { target, source })?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let mut outbound = Request::new(Full::new(body));
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        let pending = self.client.request(outbound);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| UpstreamError::Timeout(limit))?,
            None => pending.await,
        }
        .map_err(UpstreamError::Transport)?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Remove connection-scoped headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<header::HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| header::HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
