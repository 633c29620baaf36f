#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use tagcache::{
    cache::{CacheConfig, TagStore},
    infra::{
        http::{AppState, build_router},
        upstream::{Upstream, UpstreamError},
    },
};

/// Canned backend response.
#[derive(Clone)]
pub struct Scripted {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl Scripted {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn cache_keys(self, tags: &str) -> Self {
        self.header("cache-keys", tags)
    }

    pub fn clear_keys(self, tags: &str) -> Self {
        self.header("clear-keys", tags)
    }
}

/// Backend double answering `"METHOD /path?query"` from a script and counting
/// forwarded requests. Unscripted targets answer `404`; targets marked as
/// failing return a transport error.
#[derive(Default)]
pub struct FakeUpstream {
    routes: Mutex<HashMap<String, Scripted>>,
    failing: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, target: &str, response: Scripted) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(target.to_string(), response);
    }

    pub fn fail(&self, target: &str) {
        self.failing
            .lock()
            .expect("failing lock")
            .push(target.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let path = request
            .uri()
            .path_and_query()
            .map(|value| value.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let target = format!("{} {}", request.method(), path);

        if self
            .failing
            .lock()
            .expect("failing lock")
            .contains(&target)
        {
            return Err(UpstreamError::RequestBody("connection refused".to_string()));
        }

        let scripted = self
            .routes
            .lock()
            .expect("routes lock")
            .get(&target)
            .cloned()
            .unwrap_or_else(|| Scripted::ok("not found").status(StatusCode::NOT_FOUND));

        let mut response = Response::new(Body::from(scripted.body));
        *response.status_mut() = scripted.status;
        for (name, value) in scripted.headers {
            response.headers_mut().append(
                HeaderName::from_static(name),
                HeaderValue::from_str(&value).expect("valid header value"),
            );
        }
        Ok(response)
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<TagStore>,
    pub upstream: Arc<FakeUpstream>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let store = Arc::new(TagStore::with_rng(&config, fastrand::Rng::with_seed(7)));
        let upstream = FakeUpstream::new();
        let router = build_router(AppState::new(
            Arc::clone(&store),
            Arc::clone(&upstream) as Arc<dyn Upstream>,
            config,
        ));

        Self {
            router,
            store,
            upstream,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn request(&self, method: &str, uri: &str) -> Response<Body> {
        self.send(build_request(method, uri, None)).await
    }

    pub async fn request_as(&self, method: &str, uri: &str, group: &str) -> Response<Body> {
        self.send(build_request(method, uri, Some(group))).await
    }
}

pub fn build_request(method: &str, uri: &str, group: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(group) = group {
        builder = builder.header("x-access-group", group);
    }
    builder.body(Body::empty()).expect("valid request")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("readable body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}
