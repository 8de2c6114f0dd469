use base64::{engine::general_purpose, Engine as _};
use fetchit::credentials::{CredentialRecord, CredentialStore};
use fetchit::pipeline::UpdateService;
use fetchit::resolver::SystemResolver;
use fetchit::server;
use fetchit::upstream::HttpUpstream;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::AUTHORIZATION;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct SeenRequest {
    path_and_query: String,
    authorization: Option<String>,
}

/// Minimal dynamic-DNS provider: records each request and answers `good`.
async fn start_provider(status: StatusCode, body: &'static str) -> (SocketAddr, Arc<Mutex<Vec<SeenRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let recorder = recorder.clone();
            tokio::spawn(async move {
                let handler = service_fn(move |req: Request<Incoming>| {
                    let recorder = recorder.clone();
                    async move {
                        recorder.lock().unwrap().push(SeenRequest {
                            path_and_query: req.uri().path_and_query().map(|pq| pq.to_string()).unwrap_or_default(),
                            authorization: req
                                .headers()
                                .get(AUTHORIZATION)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string),
                        });
                        let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), handler)
                    .await;
            });
        }
    });

    (addr, seen)
}

async fn start_relay(provider: SocketAddr) -> SocketAddr {
    let record = CredentialRecord {
        login_password: "secret".to_string(),
        upstream_user: "u".to_string(),
        upstream_password: "p@ss".to_string(),
        hostname: "alice.example.com".to_string(),
        url_template: format!(
            "http://{{username}}:{{password}}@{}/nic/update?hostname={{hostname}}&myip={{ip}}&note={{note}}",
            provider
        ),
        force_update: true,
    };
    let mut records = HashMap::new();
    records.insert("alice".to_string(), record);

    let service = UpdateService::new(
        Arc::new(CredentialStore::new(records)),
        Arc::new(SystemResolver::new(2)),
        Arc::new(HttpUpstream::new(5)),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, Arc::new(service)));
    addr
}

async fn call_relay(relay: SocketAddr, path_and_query: &str, user: &str, pass: &str) -> (StatusCode, String) {
    let client: Client<_, Empty<Bytes>> = Client::builder(TokioExecutor::new()).build_http();
    let auth = format!("Basic {}", general_purpose::STANDARD.encode(format!("{}:{}", user, pass)));
    let req = Request::builder()
        .uri(format!("http://{}{}", relay, path_and_query))
        .header(AUTHORIZATION, auth)
        .body(Empty::new())
        .unwrap();

    let response = client.request(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_update_reaches_provider_with_basic_auth() {
    let (provider, seen) = start_provider(StatusCode::OK, "good 1.2.3.4").await;
    let relay = start_relay(provider).await;

    let (status, body) = call_relay(relay, "/?ip=1.2.3.4&note=hello%20world", "alice", "secret").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK 200\ngood 1.2.3.4");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].path_and_query,
        "/nic/update?hostname=alice.example.com&myip=1.2.3.4&note=hello%20world"
    );
    let expected = format!("Basic {}", general_purpose::STANDARD.encode("u:p@ss"));
    assert_eq!(seen[0].authorization.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_provider_rejection_is_relayed() {
    let (provider, _seen) = start_provider(StatusCode::BAD_REQUEST, "nohost").await;
    let relay = start_relay(provider).await;

    let (status, body) = call_relay(relay, "/?ip=1.2.3.4&note=x", "alice", "secret").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Fail 400\nnohost");
}

#[tokio::test]
async fn test_relay_rejects_bad_login_over_the_wire() {
    let (provider, seen) = start_provider(StatusCode::OK, "good").await;
    let relay = start_relay(provider).await;

    let (status, _) = call_relay(relay, "/?ip=1.2.3.4", "alice", "nope").await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(seen.lock().unwrap().is_empty());
}
