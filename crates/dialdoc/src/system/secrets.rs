//! Saved credentials from the pppd configuration.
//!
//! The connection's peers file names the user (`user "bob@isp"`); the
//! password is the matching entry in chap-secrets or pap-secrets
//! (`client server secret [addresses]`).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use dialdoc_shared::{CapabilityError, SavedCredential, SavedCredentialStore};

/// Split a pppd config line into words, honouring double quotes,
/// backslash escapes and `#` comments.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    has_token = true;
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            '#' if !in_quotes => break,
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

/// `user` option from a peers file
pub fn peer_user(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let tokens = tokenize(line);
        match tokens.as_slice() {
            [key, value, ..] if key == "user" => Some(value.clone()),
            _ => None,
        }
    })
}

/// Secret for `client` in a chap/pap secrets file. An entry for this
/// connection's remote name wins over a wildcard server.
pub fn find_secret(content: &str, client: &str, remote: &str) -> Option<String> {
    let mut wildcard = None;
    for line in content.lines() {
        let tokens = tokenize(line);
        let [c, server, secret, ..] = tokens.as_slice() else {
            continue;
        };
        if c != client && c != "*" {
            continue;
        }
        if server == remote {
            return Some(secret.clone());
        }
        if server == "*" && wildcard.is_none() {
            wildcard = Some(secret.clone());
        }
    }
    wildcard
}

fn read_optional(path: &Path) -> Result<Option<String>, CapabilityError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(CapabilityError::PermissionDenied(
            format!("{} is not readable", path.display()),
        )),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone)]
pub struct PppSecretsStore {
    pub peers_dir: PathBuf,
    pub secret_files: Vec<PathBuf>,
}

impl Default for PppSecretsStore {
    fn default() -> Self {
        Self::new("/etc/ppp")
    }
}

impl PppSecretsStore {
    /// Store rooted at a pppd configuration directory
    pub fn new(ppp_dir: impl AsRef<Path>) -> Self {
        let dir = ppp_dir.as_ref();
        Self {
            peers_dir: dir.join("peers"),
            secret_files: vec![dir.join("chap-secrets"), dir.join("pap-secrets")],
        }
    }
}

impl SavedCredentialStore for PppSecretsStore {
    fn lookup(&self, connection_name: &str) -> Result<Option<SavedCredential>, CapabilityError> {
        // Peer names are plain file names
        if connection_name.is_empty() || connection_name.contains('/') {
            return Ok(None);
        }

        let Some(peer) = read_optional(&self.peers_dir.join(connection_name))? else {
            debug!("No peers file for '{}'", connection_name);
            return Ok(None);
        };
        let Some(username) = peer_user(&peer) else {
            debug!("Peers file for '{}' has no user line", connection_name);
            return Ok(None);
        };

        for file in &self.secret_files {
            let Some(content) = read_optional(file)? else {
                continue;
            };
            if let Some(password) = find_secret(&content, &username, connection_name) {
                return Ok(Some(SavedCredential { username, password }));
            }
        }
        Ok(None)
    }
}
