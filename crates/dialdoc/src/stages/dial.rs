//! Credential resolution and dial attempt (full workflow).

use tracing::{debug, info};

use dialdoc_shared::{AdapterStatus, DialdocError, HealthLedger};

use super::{rank, AdapterSelection, StageContext};
use crate::credentials::{ConnectResult, CredentialResolver, CredentialSource};
use crate::pipeline::StageReport;

#[derive(Debug, Clone, Default)]
pub struct DialOutput {
    /// Source the waterfall resolved first
    pub credential_source: Option<CredentialSource>,
    pub connect: Option<ConnectResult>,
    /// Every credential source came up empty
    pub no_credentials: bool,
    /// Connection name in effect (requested or taken from the credentials file)
    pub connection_name: Option<String>,
}

/// Last non-empty line of dialer output, for record details
fn last_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

pub fn check_dial(
    mut ledger: HealthLedger,
    ctx: &StageContext<'_>,
    selection: &AdapterSelection,
) -> StageReport<DialOutput> {
    let req = ctx.options.credential_request();
    let resolver = CredentialResolver::new(ctx.caps.saved_credentials);
    let connection_name = resolver.connection_name(&req);

    // An existing session means there is nothing to dial
    match ctx.caps.routes.ppp_interfaces() {
        Ok(interfaces) => {
            let existing = interfaces.iter().find(|i| {
                i.is_up
                    && match &connection_name {
                        Some(name) => i.alias.as_deref() == Some(name.as_str()),
                        None => true,
                    }
            });
            if let Some(iface) = existing {
                let name = connection_name.clone().unwrap_or_else(|| iface.name.clone());
                info!("PPP session already up on {}, skipping dial", iface.name);
                ctx.progress.line(format!("Already connected on {}", iface.name));
                ledger.ok(
                    rank::DIAL,
                    "Dial",
                    format!("already connected on {}", iface.name),
                );
                return StageReport::done(
                    ledger,
                    DialOutput {
                        credential_source: None,
                        connect: Some(ConnectResult::already_connected(&name)),
                        no_credentials: false,
                        connection_name,
                    },
                );
            }
        }
        Err(e) => debug!("Could not list PPP interfaces before dialing: {}", e),
    }

    let credential = match resolver.resolve(&req) {
        Ok(cred) => cred,
        Err(DialdocError::NoCredentials) => {
            ledger.fail(
                rank::CREDENTIALS,
                "Credentials",
                "no credentials found in parameters, credentials file or saved store",
            );
            ledger.fail(rank::DIAL, "Dial", "skipped, no credentials");
            return StageReport::done(
                ledger,
                DialOutput {
                    no_credentials: true,
                    connection_name,
                    ..DialOutput::default()
                },
            );
        }
        Err(e) => {
            ledger.fail(rank::CREDENTIALS, "Credentials", e.to_string());
            return StageReport::done(
                ledger,
                DialOutput {
                    connection_name,
                    ..DialOutput::default()
                },
            );
        }
    };

    ledger.ok(
        rank::CREDENTIALS,
        "Credentials",
        format!("from {}", credential.source),
    );

    let Some(connection) = connection_name.clone() else {
        ledger.fail(rank::DIAL, "Dial", "no connection name given");
        return StageReport::done(
            ledger,
            DialOutput {
                credential_source: Some(credential.source),
                ..DialOutput::default()
            },
        );
    };

    // PPPoE discovery cannot work without carrier on the Ethernet side
    if let Some(adapter) = selection
        .adapter
        .as_ref()
        .filter(|a| matches!(a.status, AdapterStatus::Disconnected | AdapterStatus::Down))
    {
        ledger.fail(
            rank::DIAL,
            "Dial",
            format!("skipped, {} has no link", adapter.name),
        );
        return StageReport::done(
            ledger,
            DialOutput {
                credential_source: Some(credential.source),
                connection_name: Some(connection),
                ..DialOutput::default()
            },
        );
    }

    ctx.progress.line(format!("Dialing {}...", connection));
    let connect = match resolver.connect_with_fallback(ctx.caps.dialer, &req, credential.source) {
        Ok(result) => result,
        Err(e) => {
            ledger.fail(rank::DIAL, "Dial", e.to_string());
            return StageReport::done(
                ledger,
                DialOutput {
                    credential_source: Some(credential.source),
                    no_credentials: matches!(e, DialdocError::NoCredentials),
                    connection_name: Some(connection),
                    ..DialOutput::default()
                },
            );
        }
    };

    if connect.success {
        let detail = match connect.attempts.len() {
            0 | 1 => connect.message.clone(),
            n => format!("{} after {} attempts", connect.message, n),
        };
        ledger.ok(rank::DIAL, "Dial", detail);
    } else {
        let mut detail = connect.message.clone();
        if let Some(code) = connect.exit_code {
            detail.push_str(&format!(" (exit code {})", code));
        }
        if let Some(line) = connect.attempts.last().and_then(|a| last_line(&a.output)) {
            detail.push_str(&format!(": {}", line));
        }
        ledger.fail(rank::DIAL, "Dial", detail);

        // pppd may still hold the line after a failed negotiation
        if let Err(e) = ctx.caps.dialer.disconnect(&connection) {
            debug!("Disconnect after failed dial of '{}': {}", connection, e);
        }
    }
    ctx.progress.line(connect.message.clone());

    StageReport::done(
        ledger,
        DialOutput {
            credential_source: Some(credential.source),
            connect: Some(connect),
            no_credentials: false,
            connection_name: Some(connection),
        },
    )
}
