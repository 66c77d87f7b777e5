//! Workflow driver: quick and full diagnostic runs.
//!
//! A run is: orphan sweep, Wi-Fi toggle, the stage sequence for the
//! variant, then Wi-Fi restore and its verification. The toggle guard owns
//! the disabled adapters for the whole sequence, so an early return (caller
//! contract violation, mandatory credentials missing) still restores them
//! when the guard drops.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dialdoc_shared::{
    AdapterInfo, DialdocError, HealthLedger, HealthStatus, HealthSummary, HostFacts,
    InterfaceInfo, TraceHop,
};

use crate::config::{DialdocConfig, ProbeConfig, RoutingConfig, StabilityConfig};
use crate::credentials::{ConnectResult, CredentialRequest};
use crate::pipeline::{Pipeline, StageFault, StageReport};
use crate::progress::{LogCallback, ProgressSink};
use crate::stages::advanced::{self, DestinationResult};
use crate::stages::{
    adapter, connectivity, dial, ppp, rank, stability, system, AdapterSelection, Capabilities,
    ConnectivityOutput, DialOutput, PppDiscovery, StageContext, WorkflowVariant,
};
use crate::toggle::{self, AdapterToggleGuard, AdapterToggleRecord, ToggleRecordStore};

// =============================================================================
// Options
// =============================================================================

/// Inputs to one workflow run
pub struct WorkflowOptions {
    /// Connection (peer) name
    pub pppoe_name: String,
    pub user_name: String,
    pub password: String,
    pub credentials_file_path: Option<PathBuf>,
    /// Adapter to test instead of auto-selection
    pub target_adapter: Option<String>,
    pub skip_wifi_toggle: bool,
    /// Progress callback; absent means no-op
    pub write_log: Option<LogCallback>,
    /// Full workflow: abort with `NoCredentials` instead of recording FAIL
    pub require_credentials: bool,
    /// Run the stability test (full workflow)
    pub stability_test: bool,
    pub probes: ProbeConfig,
    pub stability: StabilityConfig,
    pub routing: RoutingConfig,
    pub toggle_record_dir: PathBuf,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            pppoe_name: String::new(),
            user_name: String::new(),
            password: String::new(),
            credentials_file_path: None,
            target_adapter: None,
            skip_wifi_toggle: false,
            write_log: None,
            require_credentials: false,
            stability_test: false,
            probes: ProbeConfig::default(),
            stability: StabilityConfig::default(),
            routing: RoutingConfig::default(),
            toggle_record_dir: crate::paths::toggle_record_dir(),
        }
    }
}

impl std::fmt::Debug for WorkflowOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOptions")
            .field("pppoe_name", &self.pppoe_name)
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("credentials_file_path", &self.credentials_file_path)
            .field("target_adapter", &self.target_adapter)
            .field("skip_wifi_toggle", &self.skip_wifi_toggle)
            .field("write_log", &self.write_log.as_ref().map(|_| "<callback>"))
            .field("require_credentials", &self.require_credentials)
            .field("stability_test", &self.stability_test)
            .field("toggle_record_dir", &self.toggle_record_dir)
            .finish_non_exhaustive()
    }
}

impl WorkflowOptions {
    /// Options seeded from the configuration file
    pub fn from_config(config: &DialdocConfig) -> Self {
        Self {
            pppoe_name: config.connection.name.clone(),
            credentials_file_path: config.connection.credentials_file.clone(),
            require_credentials: config.connection.require_credentials,
            target_adapter: config.adapters.target.clone(),
            skip_wifi_toggle: config.adapters.skip_wifi_toggle,
            stability_test: config.stability.enabled,
            probes: config.probes.clone(),
            stability: config.stability.clone(),
            routing: config.routing.clone(),
            toggle_record_dir: config.toggle_record_dir(),
            ..Self::default()
        }
    }

    pub fn credential_request(&self) -> CredentialRequest<'_> {
        CredentialRequest {
            explicit_user: &self.user_name,
            explicit_pass: &self.password,
            credentials_file: self.credentials_file_path.as_deref(),
            connection_name: &self.pppoe_name,
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Everything a run found. Always fully shaped, whatever the stages did.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub run_id: String,
    pub variant: WorkflowVariant,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub health: HealthLedger,
    pub host: Option<HostFacts>,
    pub adapter: Option<AdapterInfo>,
    pub ppp_interface: Option<InterfaceInfo>,
    pub ppp_ip: Option<IpAddr>,
    pub connection_result: Option<ConnectResult>,
    pub destinations: Vec<DestinationResult>,
    pub trace_hops: Vec<TraceHop>,
    pub disabled_wifi_adapters: Vec<String>,
    /// Every disabled adapter was seen enabled again after the run
    pub restore_confirmed: bool,
    pub faults: Vec<StageFault>,
}

impl WorkflowResult {
    pub fn overall_status(&self) -> HealthStatus {
        self.health.overall_status()
    }

    pub fn summary(&self) -> HealthSummary {
        self.health.summarize()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished - self.started).num_milliseconds()
    }
}

// =============================================================================
// Driver
// =============================================================================

/// System, adapter, PPP discovery and connectivity checks. Never dials.
pub fn run_quick_workflow(
    caps: &Capabilities<'_>,
    options: WorkflowOptions,
) -> Result<WorkflowResult, DialdocError> {
    run_workflow(WorkflowVariant::Quick, caps, options)
}

/// Quick checks plus credentials and dial, route tuning, path quality,
/// traceroute and the optional stability test.
pub fn run_full_workflow(
    caps: &Capabilities<'_>,
    options: WorkflowOptions,
) -> Result<WorkflowResult, DialdocError> {
    run_workflow(WorkflowVariant::Full, caps, options)
}

/// Outputs collected across stages
#[derive(Default)]
struct Collected {
    host: Option<HostFacts>,
    selection: AdapterSelection,
    ppp: PppDiscovery,
    dial: Option<DialOutput>,
    destinations: Vec<DestinationResult>,
    trace_hops: Vec<TraceHop>,
}

fn run_workflow(
    variant: WorkflowVariant,
    caps: &Capabilities<'_>,
    mut options: WorkflowOptions,
) -> Result<WorkflowResult, DialdocError> {
    let run_id = Uuid::new_v4().to_string();
    let started = Utc::now();
    let progress = ProgressSink::new(options.write_log.take());
    let ctx = StageContext {
        caps,
        options: &options,
        progress: &progress,
    };
    let mut pipeline = Pipeline::new(&progress);

    info!("Starting {} workflow, run {}", variant.as_str(), run_id);
    progress.line(format!("Starting {} diagnostics", variant.as_str()));
    pipeline.check_caller()?;

    let store = ToggleRecordStore::new(&options.toggle_record_dir);
    let swept = pipeline.run_stage("Orphan sweep", rank::SWEEP, |mut ledger| {
        let count = toggle::sweep_orphans(caps.adapters, &store);
        if count > 0 {
            ledger.warn(
                rank::SWEEP,
                "Orphan sweep",
                format!("re-enabled {} adapter(s) left disabled by an earlier run", count),
            );
        }
        StageReport::done(ledger, count)
    })?;
    if swept.unwrap_or(0) > 0 {
        warn!("Orphan sweep restored adapters from an earlier run");
    }

    let mut guard = AdapterToggleGuard::new(caps.adapters, store.clone(), &run_id);
    let toggled = pipeline.run_stage("Wi-Fi toggle", rank::WIFI_TOGGLE, |ledger| {
        toggle_wifi(ledger, &ctx, &mut guard)
    })?;
    if toggled.is_none() && !guard.disabled().is_empty() {
        warn!(
            "Wi-Fi toggle crashed after disabling {}",
            guard.disabled().join(", ")
        );
    }

    let collected = run_stages(variant, &mut pipeline, &ctx)?;

    if variant == WorkflowVariant::Full
        && options.require_credentials
        && collected.dial.as_ref().is_some_and(|d| d.no_credentials)
    {
        error!("No credentials available and credentials are required, aborting run");
        guard.restore();
        return Err(DialdocError::NoCredentials);
    }

    let restore_confirmed = pipeline
        .run_stage("Wi-Fi restore", rank::RESTORE, |ledger| {
            restore_wifi(ledger, &ctx, &mut guard, &store, &run_id)
        })?
        .unwrap_or(false);
    // The guard, not the stage output, knows what a crashed toggle disabled
    let disabled = guard.disabled().to_vec();
    // A restore that crashed part-way is finished here, or by the next sweep
    drop(guard);

    let (health, faults) = pipeline.into_parts();
    let overall = health.overall_status();
    progress.line(format!("Diagnostics finished: {}", overall));
    if let Some(reason) = progress.violation() {
        return Err(DialdocError::CallerContractViolation(reason));
    }
    for record in health.records() {
        debug!("{}", record.format_summary());
    }
    info!(
        "Run {} finished: {} ({} records, {} faults)",
        run_id,
        overall,
        health.len(),
        faults.len()
    );

    Ok(WorkflowResult {
        run_id,
        variant,
        started,
        finished: Utc::now(),
        host: collected.host,
        adapter: collected.selection.adapter,
        ppp_interface: collected.ppp.interface,
        ppp_ip: collected.ppp.address.map(|a| a.address),
        connection_result: collected.dial.and_then(|d| d.connect),
        destinations: collected.destinations,
        trace_hops: collected.trace_hops,
        disabled_wifi_adapters: disabled,
        restore_confirmed,
        health,
        faults,
    })
}

fn run_stages(
    variant: WorkflowVariant,
    pipeline: &mut Pipeline<'_>,
    ctx: &StageContext<'_>,
) -> Result<Collected, DialdocError> {
    let mut collected = Collected::default();

    let system_out = pipeline.run_stage("System", rank::SYSTEM, |l| system::check_system(l, ctx))?;
    collected.host = system_out.and_then(|s| s.facts);

    let selection = pipeline.run_stage("Network adapter", rank::ADAPTER, |l| {
        adapter::check_adapters(l, ctx)
    })?;

    let connection = if variant == WorkflowVariant::Full {
        let selection: AdapterSelection =
            pipeline.expect_input("Dial", rank::DIAL, "network adapter", selection.clone());
        let dialed = pipeline.run_stage("Dial", rank::DIAL, |l| dial::check_dial(l, ctx, &selection))?;
        let connection = dialed.as_ref().and_then(|d| d.connection_name.clone());
        collected.dial = dialed;
        connection
    } else {
        Some(ctx.options.pppoe_name.trim().to_string()).filter(|n| !n.is_empty())
    };
    collected.selection = selection.unwrap_or_default();

    let ppp_out = pipeline.run_stage("PPP interface", rank::PPP_INTERFACE, |l| {
        ppp::check_ppp(l, ctx, variant, connection.as_deref())
    })?;
    let ppp_in: PppDiscovery =
        pipeline.expect_input("Connectivity", rank::DNS, "PPP interface", ppp_out);

    let conn_out = pipeline.run_stage("Connectivity", rank::DNS, |l| {
        connectivity::check_connectivity(l, ctx, &ppp_in)
    })?;
    collected.ppp = ppp_in;

    if variant == WorkflowVariant::Quick {
        return Ok(collected);
    }

    let conn_in: ConnectivityOutput =
        pipeline.expect_input("Path quality", rank::PACKET_LOSS, "connectivity", conn_out);

    let quality = pipeline.run_stage("Path quality", rank::PACKET_LOSS, |l| {
        advanced::check_path_quality(l, ctx, &conn_in)
    })?;
    collected.destinations = quality.map(|q| q.destinations).unwrap_or_default();

    let trace = pipeline.run_stage("Traceroute", rank::TRACEROUTE, |l| {
        advanced::check_traceroute(l, ctx)
    })?;
    collected.trace_hops = trace.map(|t| t.hops).unwrap_or_default();

    if ctx.options.stability_test {
        pipeline.run_stage("Stability", rank::STABILITY, |l| {
            stability::check_stability(l, ctx, &conn_in)
        })?;
    }

    Ok(collected)
}

/// Disable every active wireless adapter for the rest of the run
fn toggle_wifi(
    mut ledger: HealthLedger,
    ctx: &StageContext<'_>,
    guard: &mut AdapterToggleGuard<'_>,
) -> StageReport<Vec<String>> {
    if ctx.options.skip_wifi_toggle {
        ledger.ok(rank::WIFI_TOGGLE, "Wi-Fi toggle", "skipped on request");
        return StageReport::done(ledger, Vec::new());
    }

    let adapters = match ctx.caps.adapters.list_adapters() {
        Ok(adapters) => adapters,
        Err(e) => {
            ledger.warn(
                rank::WIFI_TOGGLE,
                "Wi-Fi toggle",
                format!("could not list adapters, Wi-Fi left as is: {}", e),
            );
            return StageReport::done(ledger, Vec::new());
        }
    };

    let wireless: Vec<AdapterInfo> = adapters.into_iter().filter(|a| a.is_wireless()).collect();
    let active = wireless.iter().filter(|a| a.status.is_active()).count();
    let disabled = guard.disable_all(&wireless);

    if disabled.is_empty() && active == 0 {
        ledger.ok(rank::WIFI_TOGGLE, "Wi-Fi toggle", "no active Wi-Fi adapters");
    } else if disabled.len() == active {
        ctx.progress.line(format!("Disabled Wi-Fi: {}", disabled.join(", ")));
        ledger.ok(
            rank::WIFI_TOGGLE,
            "Wi-Fi toggle",
            format!("disabled {} for the run", disabled.join(", ")),
        );
    } else {
        ledger.warn(
            rank::WIFI_TOGGLE,
            "Wi-Fi toggle",
            format!(
                "disabled {} of {} active Wi-Fi adapters; results may use Wi-Fi",
                disabled.len(),
                active
            ),
        );
    }
    StageReport::done(ledger, disabled)
}

/// Re-enable what the guard disabled and confirm it. Anything not back is
/// persisted for the next run's sweep.
fn restore_wifi(
    mut ledger: HealthLedger,
    ctx: &StageContext<'_>,
    guard: &mut AdapterToggleGuard<'_>,
    store: &ToggleRecordStore,
    run_id: &str,
) -> StageReport<bool> {
    let names = guard.disabled().to_vec();
    if names.is_empty() {
        return StageReport::done(ledger, true);
    }

    let outcome = guard.restore();
    let pending = toggle::still_disabled(ctx.caps.adapters, &names);

    if outcome.success() && pending.is_empty() {
        ctx.progress.line(format!("Re-enabled Wi-Fi: {}", names.join(", ")));
        ledger.ok(
            rank::RESTORE,
            "Wi-Fi restore",
            format!("re-enabled {}", names.join(", ")),
        );
        return StageReport::done(ledger, true);
    }

    let mut owed = outcome.failed_names();
    owed.extend(pending.into_iter().filter(|n| !outcome.failed_names().contains(n)));
    let guard_error = DialdocError::ResourceGuard(owed.join(", "));
    error!("{}", guard_error);

    // The guard keeps its own record for failed names; verification misses
    // are written here so the next sweep retries them too
    let mut record = AdapterToggleRecord::new(run_id);
    record.adapter_names.extend(owed.iter().cloned());
    if let Err(e) = store.save(&record) {
        error!("Cannot persist toggle record for {}: {}", run_id, e);
    }

    ledger.fail(
        rank::RESTORE,
        "Wi-Fi restore",
        format!("could not confirm {} enabled, will retry on next run", owed.join(", ")),
    );
    StageReport::done(ledger, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_debug_hides_password() {
        let options = WorkflowOptions {
            password: "s3cret".to_string(),
            write_log: Some(Box::new(|_: &str| -> Result<(), String> { Ok(()) })),
            ..WorkflowOptions::default()
        };
        let debug = format!("{:?}", options);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<callback>"));
    }

    #[test]
    fn test_from_config() {
        let mut config = DialdocConfig::default();
        config.connection.name = "dsl".to_string();
        config.adapters.skip_wifi_toggle = true;
        config.stability.enabled = true;
        let options = WorkflowOptions::from_config(&config);
        assert_eq!(options.pppoe_name, "dsl");
        assert!(options.skip_wifi_toggle);
        assert!(options.stability_test);
        assert_eq!(options.credential_request().connection_name, "dsl");
    }
}
