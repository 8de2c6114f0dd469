use crate::error::RelayError;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Method};
use std::collections::{HashMap, HashSet};
use url::form_urlencoded;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub type ParameterTable = HashMap<String, String>;

/// Merge query-string and form values; for a key present in both, the form value wins.
pub fn merge(query: Option<&str>, form: Option<&[u8]>) -> Result<ParameterTable, RelayError> {
    let mut table = ParameterTable::new();

    if let Some(query) = query {
        for (key, value) in first_values(query.as_bytes())? {
            table.insert(key, value);
        }
    }

    if let Some(form) = form {
        for (key, value) in first_values(form)? {
            table.insert(key, value);
        }
    }

    Ok(table)
}

/// Parse `application/x-www-form-urlencoded` data keeping the first value of each key.
fn first_values(encoded: &[u8]) -> Result<Vec<(String, String)>, RelayError> {
    validate_encoding(encoded)?;

    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for (key, value) in form_urlencoded::parse(encoded) {
        if !seen.insert(key.to_string()) {
            continue;
        }
        ordered.push((key.into_owned(), value.into_owned()));
    }
    Ok(ordered)
}

fn validate_encoding(encoded: &[u8]) -> Result<(), RelayError> {
    if std::str::from_utf8(encoded).is_err() {
        return Err(RelayError::ParameterParse("form data is not valid UTF-8".to_string()));
    }

    let mut i = 0;
    while i < encoded.len() {
        if encoded[i] == b'%' {
            let valid = encoded
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(RelayError::ParameterParse(format!(
                    "invalid percent-escape at offset {}",
                    i
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Whether a request of this shape carries a form body worth reading.
pub fn expects_form_body(method: &Method, headers: &HeaderMap) -> bool {
    let body_method = matches!(*method, Method::POST | Method::PUT | Method::PATCH);
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));
    body_method && is_form
}

/// Read a form body, refusing anything over `limit` bytes.
pub async fn read_form_body<B>(body: B, limit: usize) -> Result<Bytes, RelayError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Limited::new(body, limit)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| RelayError::ParameterParse(format!("cannot read form body: {}", e)))
}

/// Build the per-request parameter table from a whole request.
pub async fn collect<B>(req: hyper::Request<B>, limit: usize) -> Result<ParameterTable, RelayError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let form = if expects_form_body(&parts.method, &parts.headers) {
        Some(read_form_body(body, limit).await?)
    } else {
        None
    };
    merge(parts.uri.query(), form.as_deref())
}
