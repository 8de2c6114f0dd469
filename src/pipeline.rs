//! The update endpoint: authorize, build the provider URL, skip redundant
//! updates, forward and relay the provider's answer.

use crate::auth::Authorizer;
use crate::client_ip;
use crate::common::ResponseBuilder;
use crate::config::{Config, DEFAULT_URL_TEMPLATE};
use crate::credentials::{CredentialRecord, CredentialStore};
use crate::error::RelayError;
use crate::params::{self, ParameterTable};
use crate::resolver::{HostResolver, SystemResolver};
use crate::template::{self, TemplateValues};
use crate::upstream::{self, HttpUpstream, UpstreamClient, UpstreamReply};
use bytes::{BufMut, BytesMut};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use url::form_urlencoded;

pub const SKIP_MARKER: &str = "nochn :";
pub const SUCCESS_MARKER: &str = "OK";
pub const FAILURE_MARKER: &str = "Fail";

pub struct UpdateService {
    authorizer: Authorizer,
    resolver: Arc<dyn HostResolver>,
    upstream: Arc<dyn UpstreamClient>,
    default_template: String,
    max_form_bytes: usize,
}

impl UpdateService {
    pub fn new(
        store: Arc<CredentialStore>,
        resolver: Arc<dyn HostResolver>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self {
            authorizer: Authorizer::new(store),
            resolver,
            upstream,
            default_template: DEFAULT_URL_TEMPLATE.to_string(),
            max_form_bytes: 10 * 1024 * 1024,
        }
    }

    /// Production wiring: system DNS and the hyper upstream client.
    pub fn from_config(config: &Config, store: Arc<CredentialStore>) -> Self {
        Self::new(
            store,
            Arc::new(SystemResolver::new(config.dns_timeout_secs)),
            Arc::new(HttpUpstream::new(config.upstream_timeout_secs)),
        )
        .with_default_template(config.default_url_template.clone())
        .with_max_form_bytes(config.max_form_bytes)
    }

    pub fn with_default_template(mut self, template: impl Into<String>) -> Self {
        self.default_template = template.into();
        self
    }

    pub fn with_max_form_bytes(mut self, limit: usize) -> Self {
        self.max_form_bytes = limit;
        self
    }

    /// Dispatch on path and method.
    pub async fn route<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match (req.uri().path(), req.method()) {
            ("/", &Method::GET) | ("/", &Method::POST) => self.handle_update(req, remote_addr).await,
            ("/", _) => ResponseBuilder::method_not_allowed(),
            ("/about", &Method::GET) => about_page(),
            _ => ResponseBuilder::not_found(),
        }
    }

    pub async fn handle_update<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let record = match self.authorizer.authorize(req.headers()) {
            Ok(record) => record,
            Err(failure) => return failure.response(),
        };

        match self.forward(record, req, remote_addr).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Update for {} failed: {}", record.hostname, e);
                ResponseBuilder::from_error(&e)
            }
        }
    }

    async fn forward<B>(
        &self,
        record: &CredentialRecord,
        req: Request<B>,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Response<Full<Bytes>>, RelayError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let explicit_ip = req.uri().query().and_then(query_ip);
        let ip = client_ip::target_ip(explicit_ip.as_deref(), req.headers(), remote_addr);
        debug!("Requested IP address: {:?}", ip);

        if !record.is_usable_for_forwarding() {
            return Err(RelayError::CredentialUsability(format!(
                "no upstream credentials configured for {}",
                record.hostname
            )));
        }
        if ip.is_empty() {
            return Err(RelayError::CredentialUsability("no target IP could be determined".to_string()));
        }

        let parameters = params::collect(req, self.max_form_bytes).await?;
        let url = self.build_url(record, &ip, &parameters);
        debug!("Upstream URL: {}", upstream::redact(&url));

        if !record.force_update && self.already_current(&record.hostname, &ip).await {
            info!("{} already points at {}, skipping update", record.hostname, ip);
            return Ok(ResponseBuilder::text(StatusCode::OK, format!("{} {}", SKIP_MARKER, ip)));
        }

        let reply = self.upstream.get(&url).await?;
        info!("Upstream answered {} for {}", reply.status.as_u16(), record.hostname);
        Ok(translate(&reply))
    }

    /// The record's template if set, otherwise the service default.
    pub fn active_template<'a>(&'a self, record: &'a CredentialRecord) -> &'a str {
        if record.url_template.trim().is_empty() {
            &self.default_template
        } else {
            &record.url_template
        }
    }

    /// Two passes: escaped DNS fields first, then caller parameters verbatim.
    pub fn build_url(&self, record: &CredentialRecord, ip: &str, parameters: &ParameterTable) -> String {
        let base = render_base_url(self.active_template(record), record, ip);
        template::interpolate(&base, &template::string_values(parameters))
    }

    async fn already_current(&self, hostname: &str, ip: &str) -> bool {
        match self.resolver.resolve(hostname).await {
            Ok(addrs) => addrs.first().is_some_and(|addr| addr.to_string() == ip),
            Err(e) => {
                debug!("Skip check unavailable for {}: {}", hostname, e);
                false
            }
        }
    }
}

/// First pass: fill the DNS-specific placeholders with URL-escaped values.
pub fn render_base_url(pattern: &str, record: &CredentialRecord, ip: &str) -> String {
    let mut values = TemplateValues::new();
    values.insert("username".to_string(), template::escape_url_value(&record.upstream_user).into());
    values.insert("password".to_string(), template::escape_url_value(&record.upstream_password).into());
    values.insert("hostname".to_string(), template::escape_url_value(&record.hostname).into());
    values.insert("ip".to_string(), template::escape_url_value(ip).into());
    template::interpolate(pattern, &values)
}

/// Relay the provider's status and body behind an OK/Fail marker.
///
/// Statuses that cannot carry a body (1xx, 204, 304) are answered with 200
/// so the marker still reaches the caller.
pub fn translate(reply: &UpstreamReply) -> Response<Full<Bytes>> {
    let marker = if reply.status == StatusCode::OK {
        SUCCESS_MARKER
    } else {
        FAILURE_MARKER
    };

    let mut body = BytesMut::with_capacity(reply.body.len() + 16);
    body.put_slice(format!("{} {}\n", marker, reply.status.as_u16()).as_bytes());
    body.put_slice(&reply.body);
    let status = if can_carry_body(reply.status) {
        reply.status
    } else {
        StatusCode::OK
    };
    ResponseBuilder::text(status, body.freeze())
}

fn can_carry_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

fn query_ip(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "ip")
        .map(|(_, value)| value.into_owned())
}

fn about_page() -> Response<Full<Bytes>> {
    ResponseBuilder::text(
        StatusCode::OK,
        format!(
            "fetchit {}\nAuthenticated dynamic DNS update relay.\nSend GET or POST / with Basic authentication and an optional ip parameter.\n",
            env!("CARGO_PKG_VERSION")
        ),
    )
}
