pub mod auth;
pub mod client_ip;
pub mod common;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod params;
pub mod pipeline;
pub mod resolver;
pub mod server;
pub mod template;
pub mod upstream;

pub use auth::{AuthFailure, Authorizer};
pub use config::Config;
pub use credentials::{CredentialRecord, CredentialStore};
pub use error::RelayError;
pub use pipeline::UpdateService;
pub use resolver::{HostResolver, SystemResolver};
pub use server::UpdateServer;
pub use upstream::{HttpUpstream, UpstreamClient, UpstreamReply};
