// End-to-end tests: real rule engine and HTTP client against a loopback upstream
#[cfg(test)]
mod test {
    use std::{
        io::Write,
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use axum::{
        Router,
        body::{Body, Bytes},
        extract::{Request, State},
        routing::{get, post},
    };
    use http_body_util::BodyExt;
    use hyper::StatusCode;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;
    use warden::{
        HttpClientAdapter, InspectionPipeline, RuleEngine,
        adapters::{HttpHandler, router},
        config::ServerConfig,
    };

    /// Spawn an upstream on an ephemeral loopback port, counting the requests it serves
    async fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/submit",
                post(|State(hits): State<Arc<AtomicUsize>>, body: Bytes| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (
                        [("x-received-len", body.len().to_string())],
                        "twenty bytes of data",
                    )
                }),
            )
            .route(
                "/profile",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "name=alice secret=hunter2"
                }),
            )
            .fallback(|State(hits): State<Arc<AtomicUsize>>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "fallback"
            })
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, hits)
    }

    fn proxy(config: &ServerConfig) -> Router {
        let engine = Arc::new(RuleEngine::from_config(&config.inspection).unwrap());
        let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(5)).unwrap());
        let pipeline = InspectionPipeline::new(engine, client, config).unwrap();
        router(HttpHandler::new(Arc::new(pipeline)))
    }

    fn config_for(upstream: &str) -> ServerConfig {
        ServerConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .upstream(upstream)
            .build()
            .unwrap()
    }

    async fn body_string(response: hyper::Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_xss_query_is_blocked_before_upstream() {
        let (addr, hits) = spawn_upstream().await;
        let app = proxy(&config_for(&format!("http://{addr}")));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/search?q=%3Cscript%3E")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_string(response).await.contains("941100"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clean_post_is_relayed() {
        let (addr, hits) = spawn_upstream().await;
        let app = proxy(&config_for(&format!("http://{addr}")));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/submit")
                    .body(Body::from("0123456789"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-received-len"], "10");
        assert_eq!(body_string(response).await, "twenty bytes of data");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sql_injection_in_body_is_blocked() {
        let (addr, hits) = spawn_upstream().await;
        let app = proxy(&config_for(&format!("http://{addr}")));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/submit")
                    .body(Body::from("user=admin' OR '1'='1"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_string(response).await.contains("942200"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_directive_file_inspects_response_body() {
        let (addr, hits) = spawn_upstream().await;

        let mut rules = NamedTempFile::with_suffix(".yaml").unwrap();
        rules
            .write_all(
                br#"
rules:
  - id: 990001
    phase: response_body
    targets: [response_body]
    pattern: "secret="
    status: 451
    msg: "Credential leak"
"#,
            )
            .unwrap();

        let config = ServerConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .upstream(format!("http://{addr}"))
            .directive(rules.path().to_string_lossy())
            .build()
            .unwrap();
        let app = proxy(&config);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/profile")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 451);
        let body = body_string(response).await;
        assert_eq!(body, "Interruption: deny 990001 Credential leak\n");
        assert!(!body.contains("hunter2"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_upstream_is_bad_gateway() {
        // grab a free port, then release it so nothing listens there
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let app = proxy(&config_for(&format!("http://127.0.0.1:{port}")));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_string(response).await, "Bad Gateway\n");
    }
}
