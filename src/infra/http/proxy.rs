//! Proxy interception: serve hits from the cache, forward misses, and apply the
//! backend's tag directives to what comes back.

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream};
use http_body_util::BodyExt;
use metrics::counter;
use serde_json::json;
use tracing::{debug, warn};

use crate::{
    application::{error::HttpError, intercept::take_directives},
    cache::{AccessGroup, CacheEntry, RequestKey},
};

use super::AppState;

const SOURCE: &str = "infra::http::proxy";
const TARGET: &str = "tagcache::http::proxy";

pub(super) async fn proxy(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let target = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    let request_key = RequestKey::new(request.method(), target);
    let group = AccessGroup::from_request(request.headers(), &state.config.group_header);

    if let Some(entry) = state.store.get(&request_key, &group) {
        counter!("tagcache_hit_total").increment(1);
        debug!(
            target: TARGET,
            request_key = %request_key,
            access_group = %group,
            "cache hit"
        );
        return replay(&entry);
    }

    counter!("tagcache_miss_total").increment(1);
    debug!(
        target: TARGET,
        request_key = %request_key,
        access_group = %group,
        "cache miss"
    );

    let request_headers = request.headers().clone();
    let response = match state.upstream.forward(request).await {
        Ok(response) => response,
        Err(err) => {
            counter!("tagcache_upstream_error_total").increment(1);
            return HttpError::from_error(SOURCE, StatusCode::BAD_GATEWAY, json!({}), &err)
                .into_response();
        }
    };

    let (mut parts, body) = response.into_parts();
    let directives = take_directives(&mut parts.headers, state.config.key_order);

    if let Some(tags) = directives.clear.as_deref() {
        state.store.flush(tags);
    }

    let Some(tags) = directives.cache else {
        return Response::from_parts(parts, body);
    };

    match buffer_body(body, state.config.max_body_bytes.get()).await {
        Ok(Buffered::Complete(bytes)) => {
            let group = AccessGroup::resolve(
                &parts.headers,
                &request_headers,
                &state.config.group_header,
            );
            state.store.put(CacheEntry::new(
                request_key,
                group,
                tags,
                parts.status,
                parts.headers.clone(),
                bytes.clone(),
            ));
            Response::from_parts(parts, Body::from(bytes))
        }
        Ok(Buffered::Oversized(body)) => {
            counter!("tagcache_oversized_total").increment(1);
            warn!(
                target: TARGET,
                request_key = %request_key,
                limit = state.config.max_body_bytes.get(),
                "response body exceeds buffer limit, not caching"
            );
            Response::from_parts(parts, body)
        }
        Err(err) => {
            counter!("tagcache_upstream_error_total").increment(1);
            HttpError::from_error(SOURCE, StatusCode::BAD_GATEWAY, json!({}), &err).into_response()
        }
    }
}

fn replay(entry: &CacheEntry) -> Response<Body> {
    let mut response = Response::new(Body::from(entry.body().clone()));
    *response.status_mut() = entry.status();
    *response.headers_mut() = entry.headers().clone();
    response
}

enum Buffered {
    Complete(Bytes),
    /// Buffered prefix chained with the unread remainder.
    Oversized(Body),
}

async fn buffer_body(mut body: Body, limit: usize) -> Result<Buffered, axum::Error> {
    let mut buffer = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        buffer.extend_from_slice(&data);

        if buffer.len() > limit {
            let prefix = buffer.freeze();
            let rest = stream::once(async move { Ok::<_, axum::Error>(prefix) })
                .chain(body.into_data_stream());
            return Ok(Buffered::Oversized(Body::from_stream(rest)));
        }
    }

    Ok(Buffered::Complete(buffer.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(body: Body) -> Bytes {
        body.collect().await.expect("body").to_bytes()
    }

    #[tokio::test]
    async fn small_bodies_are_buffered() {
        let buffered = buffer_body(Body::from("hello"), 16).await.expect("readable");
        match buffered {
            Buffered::Complete(bytes) => assert_eq!(bytes, Bytes::from_static(b"hello")),
            Buffered::Oversized(_) => panic!("body fits the limit"),
        }
    }

    #[tokio::test]
    async fn body_at_the_limit_is_buffered() {
        let buffered = buffer_body(Body::from("12345"), 5).await.expect("readable");
        assert!(matches!(buffered, Buffered::Complete(_)));
    }

    #[tokio::test]
    async fn oversized_bodies_stream_through_intact() {
        let chunks = stream::iter(["abc", "def", "ghi"].map(Ok::<_, axum::Error>));
        let buffered = buffer_body(Body::from_stream(chunks), 4)
            .await
            .expect("readable");

        match buffered {
            Buffered::Oversized(body) => {
                assert_eq!(collect(body).await, Bytes::from_static(b"abcdefghi"));
            }
            Buffered::Complete(_) => panic!("body exceeds the limit"),
        }
    }
}
