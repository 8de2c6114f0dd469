use crate::common::ResponseBuilder;
use crate::config::Config;
use crate::error::RelayError;
use crate::pipeline::UpdateService;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::HOST;
use hyper::server::conn::http1::Builder as ServerBuilder;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use rustls::ServerConfig;
use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Create TLS server configuration from certificate and private key files
pub fn create_tls_config(private_key_path: &str, cert_path: &str) -> Result<ServerConfig, RelayError> {
    let mut private_key_file = BufReader::new(
        File::open(private_key_path)
            .map_err(|e| RelayError::Tls(format!("Failed to open private key file: {}", e)))?,
    );

    let mut cert_file = BufReader::new(
        File::open(cert_path).map_err(|e| RelayError::Tls(format!("Failed to open certificate file: {}", e)))?,
    );

    let certs = rustls_pemfile::certs(&mut cert_file)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RelayError::Tls(format!("Failed to read certificate: {}", e)))?;

    if certs.is_empty() {
        return Err(RelayError::Tls("No valid certificate found".to_string()));
    }

    let private_key = rustls_pemfile::private_key(&mut private_key_file)
        .map_err(|e| RelayError::Tls(format!("Failed to read private key: {}", e)))?
        .ok_or_else(|| RelayError::Tls("No valid private key found".to_string()))?;

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, private_key)
        .map_err(|e| RelayError::Tls(format!("Failed to create TLS config: {}", e)))
}

/// The update listener plus the optional plaintext redirect listener.
pub struct UpdateServer {
    service: Arc<UpdateService>,
    config: Config,
}

impl UpdateServer {
    /// `service` must already hold its fully loaded credential store.
    pub fn new(config: Config, service: UpdateService) -> Self {
        Self {
            service: Arc::new(service),
            config,
        }
    }

    pub async fn run(self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        info!("Binding update listener to: {}", listener.local_addr()?);

        if !self.config.secure {
            info!("Serving plain HTTP on http://{}", listener.local_addr()?);
            return serve(listener, self.service).await;
        }

        let tls_config = create_tls_config(&self.config.key_file, &self.config.cert_file)?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        if let Some(redirect_port) = self.config.redirect_port {
            let redirect_addr = format!("{}:{}", self.config.host, redirect_port);
            let redirect_listener = TcpListener::bind(&redirect_addr).await?;
            let https_port = self.config.port;
            info!("Redirecting http://{} to HTTPS port {}", redirect_addr, https_port);
            tokio::spawn(async move {
                if let Err(e) = serve_redirects(redirect_listener, https_port).await {
                    error!("Redirect listener stopped: {}", e);
                }
            });
        }

        info!("Serving HTTPS on https://{}", listener.local_addr()?);
        serve_tls(listener, acceptor, self.service).await
    }
}

/// Accept plaintext connections forever, one task per connection.
pub async fn serve(listener: TcpListener, service: Arc<UpdateService>) -> Result<(), RelayError> {
    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let service = service.clone();
        tokio::spawn(async move {
            serve_connection(stream, remote_addr, service).await;
        });
    }
}

async fn serve_tls(listener: TcpListener, acceptor: TlsAcceptor, service: Arc<UpdateService>) -> Result<(), RelayError> {
    loop {
        let (tcp_stream, remote_addr) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let service = service.clone();

        tokio::spawn(async move {
            match acceptor.accept(tcp_stream).await {
                Ok(tls_stream) => serve_connection(tls_stream, remote_addr, service).await,
                Err(e) => warn!("Error establishing TLS connection from {}: {}", remote_addr, e),
            }
        });
    }
}

async fn serve_connection<S>(stream: S, remote_addr: SocketAddr, service: Arc<UpdateService>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    debug!("Connection from {}", remote_addr);
    let handler = service_fn(move |req: Request<Incoming>| {
        let service = service.clone();
        async move { Ok::<_, Infallible>(service.route(req, Some(remote_addr)).await) }
    });

    if let Err(e) = ServerBuilder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(stream), handler)
        .await
    {
        error!("Error serving connection from {}: {}", remote_addr, e);
    }
}

async fn serve_redirects(listener: TcpListener, https_port: u16) -> Result<(), RelayError> {
    loop {
        let (stream, remote_addr) = listener.accept().await?;
        tokio::spawn(async move {
            let handler = service_fn(move |req: Request<Incoming>| async move {
                Ok::<_, Infallible>(redirect_response(&req, https_port))
            });
            if let Err(e) = ServerBuilder::new()
                .serve_connection(TokioIo::new(stream), handler)
                .await
            {
                error!("Error serving redirect for {}: {}", remote_addr, e);
            }
        });
    }
}

fn redirect_response<B>(req: &Request<B>, https_port: u16) -> Response<Full<Bytes>> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default();
    let path = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    ResponseBuilder::redirect(&https_location(host, https_port, path))
}

/// `https://` target for a plaintext request, swapping the port if the host names one.
pub fn https_location(host: &str, https_port: u16, path_and_query: &str) -> String {
    let authority = match host.rsplit_once(':') {
        // bracketed IPv6 without a port ends in ']'
        Some((name, port)) if !port.ends_with(']') && port.chars().all(|c| c.is_ascii_digit()) => {
            format!("{}:{}", name, https_port)
        }
        _ => host.to_string(),
    };
    format!("https://{}{}", authority, path_and_query)
}
