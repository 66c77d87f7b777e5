//! PPP dialing through pppd.
//!
//! Credentials go to pppd as an options file on stdin, never on the
//! command line where any local user could read them from /proc.

use std::time::Duration;
use tracing::{info, warn};

use dialdoc_shared::redact::redact_secrets;
use dialdoc_shared::{CapabilityError, DialOutcome, WanDialer};

use super::command;

/// pppd with `updetach` returns once the link is up or has failed
const DIAL_TIMEOUT: Duration = Duration::from_secs(60);
const HANGUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Quote a value for a pppd options file
fn quote_option(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Options written to pppd's stdin
pub fn dial_options(connection_name: &str, username: &str, password: &str) -> String {
    format!(
        "user {}\npassword {}\nlinkname {}\n",
        quote_option(username),
        quote_option(password),
        quote_option(connection_name)
    )
}

#[derive(Debug, Clone)]
pub struct PppDialer {
    pub pppd: String,
    pub poff: String,
}

impl Default for PppDialer {
    fn default() -> Self {
        Self {
            pppd: "pppd".to_string(),
            poff: "poff".to_string(),
        }
    }
}

impl WanDialer for PppDialer {
    fn dial(
        &self,
        connection_name: &str,
        username: &str,
        password: &str,
    ) -> Result<DialOutcome, CapabilityError> {
        let options = dial_options(connection_name, username, password);
        let out = command::run_with_input(
            &self.pppd,
            &["call", connection_name, "updetach", "file", "/dev/stdin"],
            &options,
            DIAL_TIMEOUT,
        )
        .map_err(|e| match e {
            CapabilityError::Io(msg) => {
                CapabilityError::Io(redact_secrets(&msg, &[username, password]))
            }
            other => other,
        })?;

        let output = redact_secrets(&out.combined(), &[username, password]);
        if out.success() {
            info!("pppd connected '{}'", connection_name);
        } else {
            warn!(
                "pppd for '{}' exited with {:?}",
                connection_name, out.exit_code
            );
        }
        Ok(DialOutcome {
            success: out.success(),
            exit_code: out.exit_code,
            output,
        })
    }

    fn disconnect(&self, connection_name: &str) -> Result<(), CapabilityError> {
        let out = command::run(&self.poff, &[connection_name], HANGUP_TIMEOUT)?;
        if !out.success() {
            return Err(out.into_failure());
        }
        info!("Disconnected '{}'", connection_name);
        Ok(())
    }
}
