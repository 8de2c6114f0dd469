use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential store error: {0}")]
    Credentials(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Unusable credential: {0}")]
    CredentialUsability(String),

    #[error("Parameter parse error: {0}")]
    ParameterParse(String),

    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

impl RelayError {
    /// HTTP status reported to the caller when this error ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Authentication(_) | RelayError::CredentialUsability(_) => {
                StatusCode::UNAUTHORIZED
            }
            RelayError::Authorization(_) => StatusCode::FORBIDDEN,
            RelayError::ParameterParse(_) | RelayError::Transport(_) => StatusCode::BAD_REQUEST,
            RelayError::Http(_) => StatusCode::BAD_GATEWAY,
            RelayError::Io(_)
            | RelayError::Config(_)
            | RelayError::Credentials(_)
            | RelayError::Json(_)
            | RelayError::Url(_)
            | RelayError::Tls(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text safe to hand back to the caller.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::Authentication(_) | RelayError::CredentialUsability(_) => {
                "Unauthorized".to_string()
            }
            RelayError::Authorization(_) => "Forbidden".to_string(),
            RelayError::ParameterParse(msg) => format!("Bad Request: {}", msg),
            // Transport messages can carry the upstream address.
            RelayError::Transport(_) => "Bad Request: upstream update failed".to_string(),
            RelayError::Http(_) => "Bad Gateway".to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RelayError::Authentication("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RelayError::Authorization("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(RelayError::CredentialUsability("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RelayError::ParameterParse("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(RelayError::Transport("x".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_transport_message_hides_details() {
        let err = RelayError::Transport("connect to https://u:p@example.com failed".into());
        let message = err.public_message();
        assert!(!message.contains("u:p"));
        assert!(!message.contains("example.com"));
    }
}
