use crate::error::RelayError;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, AUTHORIZATION, USER_AGENT};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use percent_encoding::percent_decode_str;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Status and fully-read body of an upstream update call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// The dynamic-DNS provider, treated as an opaque GET endpoint.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<UpstreamReply, RelayError>;
}

pub struct HttpUpstream {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build(HttpsConnector::new()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn get(&self, url: &str) -> Result<UpstreamReply, RelayError> {
        let req = build_request(url).map_err(|e| RelayError::Transport(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| RelayError::Transport(e.to_string()))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| RelayError::Transport(format!("failed to read upstream body: {}", e)))?
                .to_bytes();
            Ok::<_, RelayError>(UpstreamReply { status, body })
        };

        timeout(self.timeout, exchange)
            .await
            .map_err(|_| RelayError::Transport(format!("upstream did not answer within {:?}", self.timeout)))?
    }
}

/// Turn a templated URL into a GET request, moving any userinfo into a Basic header.
pub fn build_request(url: &str) -> Result<Request<Empty<Bytes>>, RelayError> {
    let mut parsed = Url::parse(url)?;

    let authorization = if !parsed.username().is_empty() || parsed.password().is_some() {
        let user = percent_decode_str(parsed.username()).decode_utf8_lossy().into_owned();
        let pass = parsed
            .password()
            .map(|p| percent_decode_str(p).decode_utf8_lossy().into_owned())
            .unwrap_or_default();
        let encoded = general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
        Some(format!("Basic {}", encoded))
    } else {
        None
    };

    parsed
        .set_username("")
        .and_then(|_| parsed.set_password(None))
        .map_err(|_| RelayError::Http("upstream URL cannot carry credentials".to_string()))?;

    let uri: Uri = parsed
        .as_str()
        .parse()
        .map_err(|e: http::uri::InvalidUri| RelayError::Http(e.to_string()))?;

    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(USER_AGENT, concat!("fetchit/", env!("CARGO_PKG_VERSION")));

    if let Some(auth) = authorization {
        let value = HeaderValue::from_str(&auth)
            .map_err(|e| RelayError::Http(format!("invalid authorization header: {}", e)))?;
        builder = builder.header(AUTHORIZATION, value);
    }

    builder
        .body(Empty::new())
        .map_err(|e| RelayError::Http(e.to_string()))
}

/// URL with its password masked, for debug logging.
pub fn redact(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
