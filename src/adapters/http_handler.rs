use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
};
use hyper::Response;
use tower_http::trace::TraceLayer;

use crate::core::InspectionPipeline;

/// HTTP handler for the Warden proxy.
///
/// Every path and method is proxied; the proxy exposes no endpoints of its own.
#[derive(Clone)]
pub struct HttpHandler {
    pipeline: Arc<InspectionPipeline>,
}

impl HttpHandler {
    pub fn new(pipeline: Arc<InspectionPipeline>) -> Self {
        Self { pipeline }
    }

    /// Run one request through the inspection pipeline
    pub async fn handle_request(&self, req: Request) -> Response<AxumBody> {
        let client_addr = Self::client_addr(&req);
        self.pipeline.handle(req, client_addr).await
    }

    /// Peer address recorded by `into_make_service_with_connect_info`
    fn client_addr(req: &Request) -> SocketAddr {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
            .unwrap_or_else(|| {
                tracing::debug!("No peer address on request; using unspecified address");
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
            })
    }
}

/// Build the proxy router: a single fallback route wrapped in request tracing
pub fn router(handler: HttpHandler) -> Router {
    Router::new()
        .fallback(move |req: Request| {
            let handler = handler.clone();
            async move { handler.handle_request(req).await }
        })
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http_body_util::BodyExt;
    use hyper::StatusCode;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        adapters::{HttpClientAdapter, RuleEngine},
        config::{InspectionConfig, ServerConfig},
    };

    fn create_test_router() -> Router {
        // nothing listens on port 9 of the loopback; blocked requests never get there
        let config = ServerConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .upstream("http://127.0.0.1:9")
            .build()
            .unwrap();
        let engine = Arc::new(RuleEngine::from_config(&InspectionConfig::default()).unwrap());
        let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(2)).unwrap());
        let pipeline = InspectionPipeline::new(engine, client, &config).unwrap();
        router(HttpHandler::new(Arc::new(pipeline)))
    }

    #[tokio::test]
    async fn test_blocked_request_never_reaches_upstream() {
        let response = create_test_router()
            .oneshot(
                Request::builder()
                    .uri("/search?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
                    .body(AxumBody::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with("Interruption: deny 941100"));
    }

    #[tokio::test]
    async fn test_any_path_is_proxied() {
        let response = create_test_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(AxumBody::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // no special endpoints: the unreachable upstream answers for /health too
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_client_addr_from_connect_info() {
        let mut req = Request::builder().uri("/").body(AxumBody::empty()).unwrap();
        assert_eq!(
            HttpHandler::client_addr(&req),
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        );

        let peer: SocketAddr = "10.0.0.5:41000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(HttpHandler::client_addr(&req), peer);
    }
}
