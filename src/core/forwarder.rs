//! Relays inspected requests to the single upstream.
use std::sync::Arc;

use axum::body::Body;
use eyre::{Result, WrapErr, eyre};
use hyper::{
    HeaderMap, Request, Response, Uri,
    header::{self, HeaderName, HeaderValue},
};
use tracing::Instrument;

use crate::{
    core::ingress::PendingRequest,
    metrics::UpstreamTimer,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup::create_backend_span,
};

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Drop connection-scoped headers, including any named by `Connection`
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Replace whole occurrences of `from` in `text`.
///
/// An occurrence only counts when it ends the value or is followed by a path, query,
/// fragment or list separator, so `http://host:80801` and `http://host:8080.evil` are
/// left alone when `from` is `http://host:8080`. Returns `None` when nothing matched.
fn replace_origin(text: &str, from: &str, to: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut replaced = false;

    for (start, _) in text.match_indices(from) {
        let end = start + from.len();
        let bounded = text[end..]
            .chars()
            .next()
            .is_none_or(|c| matches!(c, '/' | '?' | '#' | ',' | ' ' | ';'));
        if !bounded {
            continue;
        }
        out.push_str(&text[last..start]);
        out.push_str(to);
        last = end;
        replaced = true;
    }

    if !replaced {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

/// Forwards a [`PendingRequest`] to the configured upstream
pub struct BackendForwarder {
    upstream_origin: String,
    upstream_host: HeaderValue,
    public_origin: String,
    client: Arc<dyn HttpClient>,
}

impl BackendForwarder {
    pub fn new(
        upstream_url: &str,
        public_origin: &str,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self> {
        let url = url::Url::parse(upstream_url)
            .wrap_err_with(|| format!("Invalid upstream URL: {upstream_url}"))?;
        let host = url
            .host_str()
            .ok_or_else(|| eyre!("Upstream URL has no host: {upstream_url}"))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let upstream_host = HeaderValue::from_str(&authority)
            .wrap_err_with(|| format!("Upstream authority is not a valid Host: {authority}"))?;

        Ok(Self {
            upstream_origin: format!("{}://{}", url.scheme(), authority),
            upstream_host,
            public_origin: public_origin.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// `scheme://authority` of the upstream
    pub fn upstream_origin(&self) -> &str {
        &self.upstream_origin
    }

    /// Build the outbound request without sending it
    pub fn prepare(&self, pending: PendingRequest) -> HttpClientResult<Request<Body>> {
        let PendingRequest { mut parts, body } = pending;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = format!("{}{}", self.upstream_origin, path_and_query);
        parts.uri = target
            .parse::<Uri>()
            .map_err(|e| HttpClientError::InvalidRequest(format!("{target}: {e}")))?;

        strip_hop_by_hop(&mut parts.headers);
        self.rewrite_origin(&mut parts.headers);
        parts.headers.insert(header::HOST, self.upstream_host.clone());

        Ok(Request::from_parts(parts, Body::from(body)))
    }

    /// Replace the proxy's public origin with the upstream origin in every header value
    fn rewrite_origin(&self, headers: &mut HeaderMap) {
        if self.public_origin.is_empty() {
            return;
        }

        for (name, value) in headers.iter_mut() {
            let Ok(text) = value.to_str() else {
                continue;
            };
            let Some(rewritten) = replace_origin(text, &self.public_origin, &self.upstream_origin)
            else {
                continue;
            };
            match HeaderValue::from_str(&rewritten) {
                Ok(new_value) => {
                    tracing::debug!(header = %name, "Rewrote public origin in header");
                    *value = new_value;
                }
                Err(e) => tracing::warn!(header = %name, "Could not rewrite header value: {}", e),
            }
        }
    }

    /// Send the request upstream. No retry is attempted.
    pub async fn forward(&self, pending: PendingRequest) -> HttpClientResult<Response<Body>> {
        let request = self.prepare(pending)?;
        let method = request.method().to_string();
        let span = create_backend_span(&self.upstream_origin, &method, request.uri().path());

        async {
            let _timer = UpstreamTimer::new(&method);
            let result = self.client.send_request(request).await;
            match &result {
                Ok(response) => {
                    tracing::Span::current()
                        .record("http.status_code", response.status().as_u16());
                    tracing::debug!("Upstream responded with {}", response.status());
                }
                Err(e) => tracing::error!("Upstream request failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }
}
