//! Report rendering: plain ASCII with optional colour, or JSON.

use owo_colors::OwoColorize;

use dialdoc_shared::{HealthRecord, HealthStatus};

use crate::workflow::WorkflowResult;

const SEPARATOR: &str = "------------------------------------------------------------";

fn paint(status: HealthStatus, text: &str, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match status {
        HealthStatus::Ok => text.bright_green().to_string(),
        HealthStatus::Warn => text.yellow().to_string(),
        HealthStatus::Fail => text.bright_red().to_string(),
    }
}

fn record_line(record: &HealthRecord, color: bool) -> String {
    let symbol = paint(record.status, &format!("{:<6}", record.status.symbol()), color);
    if record.detail.is_empty() {
        format!("  {} {}", symbol, record.label)
    } else {
        format!("  {} {:<22} {}", symbol, record.label, record.detail)
    }
}

/// Human-readable report of a run
pub fn render_text(result: &WorkflowResult, color: bool) -> String {
    let summary = result.summary();
    let mut out = Vec::new();

    let title = format!("dialdoc {} diagnostics", result.variant.as_str());
    out.push(if color { title.bold().to_string() } else { title });
    out.push(SEPARATOR.to_string());

    for record in &summary.records {
        out.push(record_line(record, color));
    }
    out.push(SEPARATOR.to_string());

    if let Some(adapter) = &result.adapter {
        out.push(format!("  Adapter:        {} ({})", adapter.name, adapter.status.as_str()));
    }
    match (&result.ppp_interface, result.ppp_ip) {
        (Some(iface), Some(ip)) => out.push(format!("  PPP interface:  {} ({})", iface.name, ip)),
        (Some(iface), None) => out.push(format!("  PPP interface:  {}", iface.name)),
        _ => out.push("  PPP interface:  none".to_string()),
    }
    if let Some(conn) = &result.connection_result {
        let source = conn
            .source
            .map(|s| format!(" via {}", s))
            .unwrap_or_default();
        out.push(format!("  Connection:     {}{}", conn.message, source));
    }
    if !result.disabled_wifi_adapters.is_empty() {
        let state = if result.restore_confirmed {
            "restored"
        } else {
            "NOT confirmed restored"
        };
        out.push(format!(
            "  Wi-Fi toggled:  {} ({})",
            result.disabled_wifi_adapters.join(", "),
            state
        ));
    }

    let counts = summary.counts;
    let overall = paint(summary.overall_status, summary.overall_status.as_str(), color);
    out.push(format!(
        "  Overall:        {}  ({} ok, {} warn, {} fail)",
        overall, counts.ok, counts.warn, counts.fail
    ));
    out.join("\n")
}

pub fn render_json(result: &WorkflowResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

/// Print a fatal error (ASCII-only)
pub fn display_error(message: &str, color: bool) {
    eprintln!();
    if color {
        eprintln!("[ERROR] {}", message.red());
    } else {
        eprintln!("[ERROR] {}", message);
    }
    eprintln!();
}
