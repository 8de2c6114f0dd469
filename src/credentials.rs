use crate::error::RelayError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CREDENTIAL_FILE_NAME: &str = ".cred.jsonc";

/// One authorized caller and the DNS record it may update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialRecord {
    /// Compared verbatim against the Basic-Auth password.
    #[serde(rename = "password")]
    pub login_password: String,
    #[serde(rename = "dd-user")]
    pub upstream_user: String,
    #[serde(rename = "dd-pass")]
    pub upstream_password: String,
    #[serde(rename = "host")]
    pub hostname: String,
    /// Empty means the configured default template.
    #[serde(rename = "url-template")]
    pub url_template: String,
    #[serde(rename = "force-update")]
    pub force_update: bool,
}

impl CredentialRecord {
    /// Both upstream credentials are present after trimming.
    pub fn is_usable_for_forwarding(&self) -> bool {
        !self.upstream_user.trim().is_empty() && !self.upstream_password.trim().is_empty()
    }
}

/// Read-only login table, built once before the listener starts.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    records: HashMap<String, CredentialRecord>,
}

impl CredentialStore {
    pub fn new(records: HashMap<String, CredentialRecord>) -> Self {
        Self { records }
    }

    /// Case-sensitive lookup by login name.
    pub fn lookup(&self, username: &str) -> Option<&CredentialRecord> {
        self.records.get(username)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn from_jsonc(content: &str) -> Result<Self, RelayError> {
        let stripped = strip_jsonc_comments(content);
        let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&stripped)
            .map_err(|e| RelayError::Credentials(format!("invalid credential document: {}", e)))?;

        let mut records = HashMap::new();
        for (username, value) in entries {
            // "//" and "#" keys are comment entries
            if username.starts_with("//") || username.starts_with('#') {
                continue;
            }
            let record: CredentialRecord = serde_json::from_value(value).map_err(|e| {
                RelayError::Credentials(format!("invalid entry for user '{}': {}", username, e))
            })?;
            if !record.is_usable_for_forwarding() {
                warn!("Credential for '{}' has no upstream user/password; updates will be refused", username);
            }
            records.insert(username, record);
        }

        Ok(Self::new(records))
    }

    pub fn from_file(path: &Path) -> Result<Self, RelayError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        let store = Self::from_jsonc(&content)?;
        info!("Loaded {} credential(s) from {}", store.len(), path.display());
        Ok(store)
    }

    /// Load from `explicit` if given, otherwise from the first existing default location.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, RelayError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => candidate_paths()
                .into_iter()
                .find(|p| {
                    debug!("Checking credential file at: {}", p.display());
                    p.is_file()
                })
                .ok_or_else(|| {
                    RelayError::Credentials("credential file not found in expected locations".to_string())
                })?,
        };
        Self::from_file(&path)
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/fetchit/cred.jsonc")];
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(CREDENTIAL_FILE_NAME));
    }
    if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        paths.push(dir.join(CREDENTIAL_FILE_NAME));
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("fetchit").join("cred.jsonc"));
    }
    paths
}

/// Drop `//`, `#` and `/* */` comments that sit outside string literals.
pub fn strip_jsonc_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '#' => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    if inner == '\n' {
                        out.push('\n');
                    }
                    prev = inner;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    for c in chars.by_ref() {
        if c == '\n' {
            out.push('\n');
            break;
        }
    }
}
