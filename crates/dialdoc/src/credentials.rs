//! Credential resolution waterfall and connect-with-fallback.
//!
//! Sources are tried in a fixed order, first usable pair wins:
//! 1. Explicit parameters (both user and password given)
//! 2. Credentials file (see `FIELD_ALIASES` for accepted key names)
//! 3. Saved store registered with the platform for the connection
//!
//! Anything that goes wrong with a source (missing file, bad syntax,
//! store lookup error) only makes that source unavailable. The single hard
//! failure is `DialdocError::NoCredentials`.
//!
//! Passwords never appear in `Debug` output, results or log lines.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use dialdoc_shared::redact::redact_secrets;
use dialdoc_shared::{DialOutcome, DialdocError, SavedCredentialStore, WanDialer};

// =============================================================================
// Sources
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    Parameters,
    File,
    SavedStore,
}

impl CredentialSource {
    /// Waterfall order
    pub const ALL: [CredentialSource; 3] = [
        CredentialSource::Parameters,
        CredentialSource::File,
        CredentialSource::SavedStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Parameters => "parameters",
            CredentialSource::File => "credentials file",
            CredentialSource::SavedStore => "saved store",
        }
    }

    /// Sources from `self` onwards in waterfall order
    pub fn and_after(self) -> impl Iterator<Item = CredentialSource> {
        Self::ALL.into_iter().skip_while(move |s| *s != self)
    }
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A usable username/password pair and where it came from
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub source: CredentialSource,
    pub username: String,
    password: String,
    /// Connection name declared alongside the credential (file source)
    pub connection_name: Option<String>,
}

impl ResolvedCredential {
    pub fn new(source: CredentialSource, username: &str, password: &str) -> Self {
        Self {
            source,
            username: username.to_string(),
            password: password.to_string(),
            connection_name: None,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("source", &self.source)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

// =============================================================================
// Credentials file
// =============================================================================

/// Logical fields of a credentials file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Username,
    Password,
    Connection,
}

/// Accepted key names per field, compared case-insensitively with `-`
/// folded to `_`. The first name is the canonical one.
pub const FIELD_ALIASES: &[(CredentialField, &[&str])] = &[
    (
        CredentialField::Username,
        &[
            "username",
            "user",
            "user_name",
            "login",
            "pppoe_user",
            "pppoeuser",
            "pppoe_username",
        ],
    ),
    (
        CredentialField::Password,
        &[
            "password",
            "pass",
            "passwd",
            "pwd",
            "pppoe_password",
            "pppoepassword",
            "pppoe_pass",
        ],
    ),
    (
        CredentialField::Connection,
        &[
            "connection",
            "connection_name",
            "pppoe_name",
            "pppoename",
            "entry",
            "name",
        ],
    ),
];

/// Map a raw key to its field, if it is a known alias
pub fn canonical_field(key: &str) -> Option<CredentialField> {
    let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
    FIELD_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&normalized.as_str()))
        .map(|(field, _)| *field)
}

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?\$?(?P<key>[A-Za-z_][A-Za-z0-9_\-]*)\s*[=:]\s*(?P<value>.*?)\s*$")
        .unwrap()
});

/// A `,` or `;` that starts another known `key=` pair on the same line
static PAIR_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    let mut aliases: Vec<&str> = FIELD_ALIASES
        .iter()
        .flat_map(|(_, names)| names.iter().copied())
        .collect();
    aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));
    let pattern = format!(
        r"(?i)[,;]\s*(?:export\s+)?\$?(?:{})\s*[=:]",
        aliases.join("|").replace('_', "[_-]")
    );
    Regex::new(&pattern).unwrap()
});

#[derive(Error, Debug)]
pub enum CredentialFileError {
    #[error("credentials file {0} does not exist")]
    Missing(PathBuf),

    #[error("cannot read credentials file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credentials file: {0}")]
    Malformed(String),
}

/// Parsed contents of a credentials file
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialFile {
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection: Option<String>,
}

impl std::fmt::Debug for CredentialFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialFile")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connection", &self.connection)
            .finish()
    }
}

impl CredentialFile {
    fn set(&mut self, field: CredentialField, value: String) {
        match field {
            CredentialField::Username => self.username = Some(value),
            CredentialField::Password => self.password = Some(value),
            CredentialField::Connection => self.connection = Some(value),
        }
    }

    /// Both username and password present and non-empty
    pub fn is_usable(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.username) && filled(&self.password)
    }
}

fn unquote(raw: &str) -> String {
    let value = raw.trim();
    let stripped = value.strip_suffix(';').map(str::trim_end).unwrap_or(value);
    for quote in ['"', '\''] {
        if stripped.len() >= 2 && stripped.starts_with(quote) && stripped.ends_with(quote) {
            return stripped[1..stripped.len() - 1].to_string();
        }
    }
    value.to_string()
}

fn split_pairs(line: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    for m in PAIR_SEPARATOR.find_iter(line) {
        segments.push(&line[start..m.start()]);
        // Separator is a single ASCII byte
        start = m.start() + 1;
    }
    segments.push(&line[start..]);
    segments
}

/// Parse credentials file content.
///
/// Accepts a JSON object, or line-based `key=value` / `key: value` /
/// `$key = "value"` / `export KEY=value` entries, several pairs per line
/// separated by `,` or `;`. Unknown keys are ignored; later values win.
pub fn parse_credentials(content: &str) -> Result<CredentialFile, CredentialFileError> {
    let mut parsed = CredentialFile::default();

    if content.trim_start().starts_with('{') {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)
            .map_err(|e| CredentialFileError::Malformed(e.to_string()))?;
        for (key, value) in map {
            if let (Some(field), Some(text)) = (canonical_field(&key), value.as_str()) {
                parsed.set(field, text.to_string());
            }
        }
        return Ok(parsed);
    }

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("//")
            || trimmed.starts_with('[')
        {
            continue;
        }

        for segment in split_pairs(trimmed) {
            let Some(caps) = KEY_VALUE.captures(segment) else {
                continue;
            };
            if let Some(field) = canonical_field(&caps["key"]) {
                parsed.set(field, unquote(&caps["value"]));
            }
        }
    }

    Ok(parsed)
}

pub fn load_credentials_file(path: &Path) -> Result<CredentialFile, CredentialFileError> {
    if !path.exists() {
        return Err(CredentialFileError::Missing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| CredentialFileError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_credentials(&content)
}

// =============================================================================
// Resolver
// =============================================================================

/// Inputs to one resolution
#[derive(Clone, Copy, Default)]
pub struct CredentialRequest<'a> {
    pub explicit_user: &'a str,
    pub explicit_pass: &'a str,
    pub credentials_file: Option<&'a Path>,
    pub connection_name: &'a str,
}

impl std::fmt::Debug for CredentialRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRequest")
            .field("explicit_user", &self.explicit_user)
            .field("explicit_pass", &"<redacted>")
            .field("credentials_file", &self.credentials_file)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

pub struct CredentialResolver<'a> {
    store: &'a dyn SavedCredentialStore,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(store: &'a dyn SavedCredentialStore) -> Self {
        Self { store }
    }

    /// First usable credential in waterfall order
    pub fn resolve(&self, req: &CredentialRequest<'_>) -> Result<ResolvedCredential, DialdocError> {
        self.resolve_from(CredentialSource::Parameters, req)
    }

    /// First usable credential from `start` onwards
    pub fn resolve_from(
        &self,
        start: CredentialSource,
        req: &CredentialRequest<'_>,
    ) -> Result<ResolvedCredential, DialdocError> {
        start
            .and_after()
            .find_map(|source| self.try_source(source, req))
            .ok_or(DialdocError::NoCredentials)
    }

    /// Connection name to use: the requested one, else the file's
    pub fn connection_name(&self, req: &CredentialRequest<'_>) -> Option<String> {
        if !req.connection_name.trim().is_empty() {
            return Some(req.connection_name.trim().to_string());
        }
        req.credentials_file
            .and_then(|p| load_credentials_file(p).ok())
            .and_then(|f| f.connection)
            .filter(|c| !c.trim().is_empty())
    }

    fn try_source(
        &self,
        source: CredentialSource,
        req: &CredentialRequest<'_>,
    ) -> Option<ResolvedCredential> {
        match source {
            CredentialSource::Parameters => {
                if req.explicit_user.trim().is_empty() || req.explicit_pass.is_empty() {
                    return None;
                }
                Some(ResolvedCredential::new(
                    source,
                    req.explicit_user.trim(),
                    req.explicit_pass,
                ))
            }
            CredentialSource::File => {
                let path = req.credentials_file?;
                match load_credentials_file(path) {
                    Ok(file) if file.is_usable() => {
                        let mut cred = ResolvedCredential::new(
                            source,
                            file.username.as_deref().unwrap_or_default().trim(),
                            file.password.as_deref().unwrap_or_default(),
                        );
                        cred.connection_name = file.connection;
                        Some(cred)
                    }
                    Ok(_) => {
                        debug!("Credentials file {} has no usable pair", path.display());
                        None
                    }
                    Err(e) => {
                        debug!("Credentials file unavailable: {}", e);
                        None
                    }
                }
            }
            CredentialSource::SavedStore => {
                let connection = self.connection_name(req)?;
                match self.store.lookup(&connection) {
                    Ok(Some(saved)) if !saved.username.is_empty() && !saved.password.is_empty() => {
                        let mut cred =
                            ResolvedCredential::new(source, &saved.username, &saved.password);
                        cred.connection_name = Some(connection);
                        Some(cred)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        debug!("Saved credential lookup for '{}' failed: {}", connection, e);
                        None
                    }
                }
            }
        }
    }

    /// Dial starting from `preferred`, advancing to the next source after
    /// an authentication-class failure. At most one attempt per source.
    /// Any other failure ends the sequence.
    pub fn connect_with_fallback(
        &self,
        dialer: &dyn WanDialer,
        req: &CredentialRequest<'_>,
        preferred: CredentialSource,
    ) -> Result<ConnectResult, DialdocError> {
        let connection = self.connection_name(req).unwrap_or_default();
        let mut result = ConnectResult::new(&connection);

        for source in preferred.and_after() {
            let Some(cred) = self.try_source(source, req) else {
                continue;
            };

            info!("Dialing '{}' with credentials from {}", connection, source);
            let secrets = [cred.username.as_str(), cred.password()];
            let attempt = match dialer.dial(&connection, &cred.username, cred.password()) {
                Ok(outcome) => ConnectAttempt::from_outcome(source, &outcome, &secrets),
                Err(e) => ConnectAttempt {
                    source,
                    success: false,
                    exit_code: None,
                    auth_failure: false,
                    output: redact_secrets(&e.to_string(), &secrets),
                },
            };

            let success = attempt.success;
            let retry = attempt.auth_failure;
            result.exit_code = attempt.exit_code;
            result.attempts.push(attempt);

            if success {
                result.success = true;
                result.source = Some(source);
                result.message = format!("Connected using {}", source);
                return Ok(result);
            }
            if !retry {
                result.message = format!("Dial failed using {}", source);
                return Ok(result);
            }
            warn!("Authentication failed using {}, trying next source", source);
        }

        if result.attempts.is_empty() {
            return Err(DialdocError::NoCredentials);
        }
        result.message = format!(
            "Authentication failed for all {} credential source(s)",
            result.attempts.len()
        );
        Ok(result)
    }
}

// =============================================================================
// Connect results
// =============================================================================

/// Exit codes that mean "the peer rejected our credentials": pppd's
/// authentication failure status and the RAS error code 691.
pub const AUTH_FAILURE_EXIT_CODES: &[i32] = &[19, 691];

pub fn is_auth_failure(outcome: &DialOutcome) -> bool {
    if outcome.success {
        return false;
    }
    if outcome
        .exit_code
        .is_some_and(|c| AUTH_FAILURE_EXIT_CODES.contains(&c))
    {
        return true;
    }
    let lower = outcome.output.to_lowercase();
    lower.contains("authentication failed") || lower.contains("auth failed")
}

/// One dial attempt with one credential source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAttempt {
    pub source: CredentialSource,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub auth_failure: bool,
    /// Redacted dialer output
    pub output: String,
}

impl ConnectAttempt {
    fn from_outcome(source: CredentialSource, outcome: &DialOutcome, secrets: &[&str]) -> Self {
        Self {
            source,
            success: outcome.success,
            exit_code: outcome.exit_code,
            auth_failure: is_auth_failure(outcome),
            output: redact_secrets(&outcome.output, secrets),
        }
    }
}

/// Outcome of connect-with-fallback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    pub success: bool,
    pub connection_name: String,
    /// Source that connected, absent when none did
    pub source: Option<CredentialSource>,
    pub exit_code: Option<i32>,
    pub message: String,
    pub attempts: Vec<ConnectAttempt>,
}

impl ConnectResult {
    pub fn new(connection_name: &str) -> Self {
        Self {
            success: false,
            connection_name: connection_name.to_string(),
            source: None,
            exit_code: None,
            message: String::new(),
            attempts: Vec::new(),
        }
    }

    /// Result for a session that was already up before the run
    pub fn already_connected(connection_name: &str) -> Self {
        Self {
            success: true,
            message: "Connection already established".to_string(),
            ..Self::new(connection_name)
        }
    }
}
