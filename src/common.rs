use crate::error::RelayError;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE};
use hyper::{Response, StatusCode};

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const AUTH_REALM: &str = "Basic realm=\"fetchit\"";

/// Plain-text response helpers shared by the pipeline and the listeners.
pub struct ResponseBuilder;

impl ResponseBuilder {
    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        response
    }

    /// 401 with a Basic challenge so browsers prompt for credentials.
    pub fn unauthorized() -> Response<Full<Bytes>> {
        let mut response = Self::text(StatusCode::UNAUTHORIZED, "Unauthorized");
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static(AUTH_REALM));
        response
    }

    pub fn forbidden() -> Response<Full<Bytes>> {
        Self::text(StatusCode::FORBIDDEN, "Forbidden")
    }

    pub fn not_found() -> Response<Full<Bytes>> {
        Self::text(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn method_not_allowed() -> Response<Full<Bytes>> {
        Self::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    pub fn redirect(location: &str) -> Response<Full<Bytes>> {
        let mut response = Self::text(StatusCode::FOUND, "Found");
        match HeaderValue::from_str(location) {
            Ok(value) => {
                response.headers_mut().insert(LOCATION, value);
                response
            }
            Err(_) => Self::text(StatusCode::BAD_REQUEST, "Bad Request"),
        }
    }

    /// Render a request-boundary error without leaking internal details.
    pub fn from_error(error: &RelayError) -> Response<Full<Bytes>> {
        match error.status() {
            StatusCode::UNAUTHORIZED => Self::unauthorized(),
            status => Self::text(status, error.public_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_has_challenge() {
        let response = ResponseBuilder::unauthorized();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), AUTH_REALM);
    }

    #[test]
    fn test_from_error_maps_status() {
        let response = ResponseBuilder::from_error(&RelayError::Transport("boom".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ResponseBuilder::from_error(&RelayError::CredentialUsability("blank".into()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(WWW_AUTHENTICATE));
    }

    #[test]
    fn test_redirect_rejects_invalid_location() {
        let response = ResponseBuilder::redirect("https://example.com/\n");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ResponseBuilder::redirect("https://example.com:8443/?ip=1.2.3.4");
        assert_eq!(response.status(), StatusCode::FOUND);
    }
}
