use crate::common::ResponseBuilder;
use crate::credentials::{CredentialRecord, CredentialStore};
use crate::error::RelayError;
use base64::{engine::general_purpose, Engine as _};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::AUTHORIZATION;
use hyper::{HeaderMap, Response, StatusCode};
use log::{debug, info, warn};
use std::sync::Arc;

const BASIC_PREFIX: &str = "Basic ";

/// Why a request failed Basic authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingOrMalformedHeader,
    BadEncoding,
    MalformedCredentialPair,
    UnknownUser,
    WrongPassword,
}

impl AuthFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthFailure::MissingOrMalformedHeader
            | AuthFailure::BadEncoding
            | AuthFailure::MalformedCredentialPair => StatusCode::UNAUTHORIZED,
            AuthFailure::UnknownUser | AuthFailure::WrongPassword => StatusCode::FORBIDDEN,
        }
    }

    pub fn response(&self) -> Response<Full<Bytes>> {
        match self.status() {
            StatusCode::FORBIDDEN => ResponseBuilder::forbidden(),
            _ => ResponseBuilder::unauthorized(),
        }
    }
}

impl From<AuthFailure> for RelayError {
    fn from(failure: AuthFailure) -> Self {
        let detail = format!("{:?}", failure);
        match failure.status() {
            StatusCode::FORBIDDEN => RelayError::Authorization(detail),
            _ => RelayError::Authentication(detail),
        }
    }
}

/// Checks `Authorization: Basic` headers against an injected credential store.
#[derive(Debug, Clone)]
pub struct Authorizer {
    store: Arc<CredentialStore>,
}

impl Authorizer {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    pub fn authorize(&self, headers: &HeaderMap) -> Result<&CredentialRecord, AuthFailure> {
        let auth_str = match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some(value) if value.starts_with(BASIC_PREFIX) => &value[BASIC_PREFIX.len()..],
            _ => {
                info!("Request without Basic authorization");
                return Err(AuthFailure::MissingOrMalformedHeader);
            }
        };

        let decoded = general_purpose::STANDARD.decode(auth_str.trim()).map_err(|_| {
            warn!("Bad encoding for credentials");
            AuthFailure::BadEncoding
        })?;
        let credentials = String::from_utf8(decoded).map_err(|_| {
            warn!("Credentials are not valid UTF-8");
            AuthFailure::BadEncoding
        })?;

        let (username, password) = credentials.split_once(':').ok_or_else(|| {
            warn!("Credentials without a username/password separator");
            AuthFailure::MalformedCredentialPair
        })?;

        let record = self.store.lookup(username).ok_or_else(|| {
            warn!("Unknown user '{}'", username);
            AuthFailure::UnknownUser
        })?;

        if record.login_password != password {
            warn!("Wrong password for user '{}'", username);
            return Err(AuthFailure::WrongPassword);
        }

        debug!("Authorized user '{}'", username);
        Ok(record)
    }
}
