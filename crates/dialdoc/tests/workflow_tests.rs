//! End-to-end workflow tests against in-memory hosts
//!
//! Tests cover:
//! - Quick run on an offline host: well-shaped result, Wi-Fi restored
//! - Full run on a healthy connected host: all checks OK
//! - Full run dialing with explicit credentials
//! - Dial skipped without carrier or credentials
//! - Mandatory credentials abort the run after restoring Wi-Fi
//! - Crashing adapter provider becomes a FAIL record, not a crash
//! - A toggle that crashes part-way still reports and restores what it disabled
//! - A crashed stage leaves its successor a MissingInput FAIL
//! - Failing log callback aborts the run and still restores Wi-Fi
//! - Route metric tuning when another default route wins
//! - Text and JSON reports never carry the username or password

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{
    ethernet, test_options, wifi, FakeAdapters, FakeDialer, FakeHost, FakeProbe, FakeRoutes,
};
use dialdoc::{report, run_full_workflow, run_quick_workflow, StageFaultKind, ToggleRecordStore};
use dialdoc_shared::{
    AdapterStatus, DialOutcome, DialdocError, HealthStatus, InterfaceInfo, MediaType, RouteInfo,
};
use tempfile::TempDir;

const TARGETS: [&str; 3] = ["1.1.1.1", "8.8.8.8", "9.9.9.9"];

fn status_of(result: &dialdoc::WorkflowResult, label: &str) -> Option<HealthStatus> {
    result.health.find_label(label).map(|r| r.status)
}

fn connected_host() -> FakeHost {
    FakeHost {
        probe: FakeProbe::online(&TARGETS),
        routes: FakeRoutes::session("DSL", "203.0.113.7"),
        ..FakeHost::offline()
    }
}

#[test]
fn test_quick_offline_host() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::offline();
    let mut options = test_options(dir.path());
    options.pppoe_name = "Test".to_string();

    let result = run_quick_workflow(&host.capabilities(), options).unwrap();

    assert!(result.ppp_interface.is_none());
    assert!(result.ppp_ip.is_none());
    assert!(result.connection_result.is_none(), "quick never dials");
    assert!(result.health.len() >= 3);
    assert_ne!(result.overall_status(), HealthStatus::Ok);
    assert_eq!(status_of(&result, "PPP interface"), Some(HealthStatus::Warn));
    assert_eq!(status_of(&result, "Internet reachability"), Some(HealthStatus::Fail));
    assert_eq!(status_of(&result, "Network adapter"), Some(HealthStatus::Ok));
    assert_eq!(result.adapter.as_ref().map(|a| a.name.as_str()), Some("eth0"));

    assert_eq!(result.disabled_wifi_adapters, vec!["wlan0"]);
    assert!(result.restore_confirmed);
    assert_eq!(host.adapters.status("wlan0"), Some(AdapterStatus::Up));
    assert!(host.dialer.dials.lock().unwrap().is_empty());
    assert!(ToggleRecordStore::new(dir.path()).load_all().is_empty());
}

#[test]
fn test_quick_skip_wifi_toggle() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::offline();
    let mut options = test_options(dir.path());
    options.skip_wifi_toggle = true;

    let result = run_quick_workflow(&host.capabilities(), options).unwrap();
    assert!(result.disabled_wifi_adapters.is_empty());
    assert!(host.adapters.calls.lock().unwrap().is_empty());
}

#[test]
fn test_full_connected_host_all_ok() {
    let dir = TempDir::new().unwrap();
    let host = connected_host();
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    let summary = result.summary();
    assert_eq!(
        result.overall_status(),
        HealthStatus::Ok,
        "unexpected records: {:?}",
        summary.records
    );
    assert!(result.faults.is_empty());
    assert_eq!(result.ppp_interface.as_ref().map(|i| i.name.as_str()), Some("ppp0"));
    assert_eq!(result.ppp_ip, Some("203.0.113.7".parse().unwrap()));

    let conn = result.connection_result.as_ref().unwrap();
    assert!(conn.success);
    assert!(conn.attempts.is_empty(), "already connected, no dial");
    assert!(host.dialer.dials.lock().unwrap().is_empty());

    assert_eq!(result.destinations.len(), 3);
    assert!(result.destinations.iter().all(|d| d.reachable));
    assert_eq!(result.trace_hops.len(), 2);
    let reach = result.health.find_label("Internet reachability").unwrap();
    assert!(reach.detail.contains("via ppp0"));
}

#[test]
fn test_full_dials_with_parameters() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost {
        probe: FakeProbe::online(&TARGETS),
        ..FakeHost::offline()
    };
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.user_name = "alice@isp".to_string();
    options.password = "hunter2".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    let dials = host.dialer.dials.lock().unwrap().clone();
    assert_eq!(dials.len(), 1);
    assert_eq!(dials[0].0, "DSL");
    assert_eq!(dials[0].1, "alice@isp");

    let conn = result.connection_result.as_ref().unwrap();
    assert!(conn.success);
    assert_eq!(conn.source, Some(dialdoc::CredentialSource::Parameters));
    assert_eq!(status_of(&result, "Dial"), Some(HealthStatus::Ok));
    assert_eq!(status_of(&result, "Credentials"), Some(HealthStatus::Ok));
    // The fake dialer brings no interface up
    assert_eq!(status_of(&result, "PPP interface"), Some(HealthStatus::Fail));

    let credentials = result.health.find_label("Credentials").unwrap();
    assert_eq!(credentials.detail, "from parameters");
    assert!(!credentials.detail.contains("hunter2"));

    let json = report::render_json(&result).unwrap();
    assert!(!json.contains("alice@isp"));
    assert!(!json.contains("hunter2"));
}

#[test]
fn test_dialer_output_never_reaches_reports() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost {
        dialer: FakeDialer::scripted(vec![DialOutcome {
            success: false,
            exit_code: Some(8),
            output: "sent [PAP AuthReq id=0x1 user=\"alice@isp\" password=\"hunter2\"]\n\
                     Connect script failed for alice@isp"
                .to_string(),
        }]),
        ..FakeHost::offline()
    };
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.user_name = "alice@isp".to_string();
    options.password = "hunter2".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    assert_eq!(status_of(&result, "Dial"), Some(HealthStatus::Fail));
    let dial = result.health.find_label("Dial").unwrap();
    assert!(dial.detail.contains("exit code 8"), "detail: {}", dial.detail);
    for record in result.health.records() {
        assert!(!record.detail.contains("alice@isp"), "leak in {}", record.label);
        assert!(!record.detail.contains("hunter2"), "leak in {}", record.label);
    }

    let conn = result.connection_result.as_ref().unwrap();
    assert!(!conn.attempts[0].output.contains("alice@isp"));

    let json = report::render_json(&result).unwrap();
    assert!(!json.contains("alice@isp"));
    assert!(!json.contains("hunter2"));
    let text = report::render_text(&result, false);
    assert!(!text.contains("alice@isp"));
}

#[test]
fn test_failed_dial_hangs_up() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost {
        dialer: FakeDialer::scripted(vec![DialOutcome {
            success: false,
            exit_code: Some(16),
            output: "Modem hangup".to_string(),
        }]),
        ..FakeHost::offline()
    };
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.user_name = "alice".to_string();
    options.password = "hunter2".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    assert_eq!(status_of(&result, "Dial"), Some(HealthStatus::Fail));
    assert_eq!(*host.dialer.disconnects.lock().unwrap(), vec!["DSL"]);
}

#[test]
fn test_successful_dial_keeps_line_up() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::offline();
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.user_name = "alice".to_string();
    options.password = "hunter2".to_string();

    run_full_workflow(&host.capabilities(), options).unwrap();

    assert_eq!(host.dialer.dials.lock().unwrap().len(), 1);
    assert!(host.dialer.disconnects.lock().unwrap().is_empty());
}

#[test]
fn test_unnamed_session_does_not_satisfy_named_dial() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost {
        routes: FakeRoutes {
            interfaces: vec![InterfaceInfo {
                name: "ppp0".to_string(),
                alias: None,
                media_type: MediaType::Ppp,
                is_up: true,
                mtu: Some(1492),
            }],
            ..FakeRoutes::default()
        },
        ..FakeHost::offline()
    };
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.user_name = "alice".to_string();
    options.password = "hunter2".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    let dials = host.dialer.dials.lock().unwrap().clone();
    assert_eq!(dials.len(), 1, "ppp0 belongs to no known connection");
    assert_eq!(dials[0].0, "DSL");
    let conn = result.connection_result.as_ref().unwrap();
    assert_eq!(conn.attempts.len(), 1);
}

#[test]
fn test_full_dial_skipped_without_carrier() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost {
        adapters: FakeAdapters::new(vec![
            ethernet("eth0", AdapterStatus::Disconnected),
            wifi("wlan0", AdapterStatus::Up),
        ]),
        ..FakeHost::offline()
    };
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.user_name = "alice".to_string();
    options.password = "pw".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    assert!(host.dialer.dials.lock().unwrap().is_empty());
    assert_eq!(status_of(&result, "Link state"), Some(HealthStatus::Fail));
    let dial = result.health.find_label("Dial").unwrap();
    assert_eq!(dial.status, HealthStatus::Fail);
    assert!(dial.detail.contains("eth0"));
}

#[test]
fn test_full_without_credentials_records_fail() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::offline();
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    assert_eq!(status_of(&result, "Credentials"), Some(HealthStatus::Fail));
    assert_eq!(status_of(&result, "Dial"), Some(HealthStatus::Fail));
    assert_eq!(result.overall_status(), HealthStatus::Fail);
    assert!(result.connection_result.is_none());
}

#[test]
fn test_full_required_credentials_abort() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::offline();
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.require_credentials = true;

    let err = run_full_workflow(&host.capabilities(), options).unwrap_err();
    assert!(matches!(err, DialdocError::NoCredentials));
    assert_eq!(host.adapters.status("wlan0"), Some(AdapterStatus::Up));
    assert!(ToggleRecordStore::new(dir.path()).load_all().is_empty());
}

#[test]
fn test_crashing_adapter_provider() {
    let dir = TempDir::new().unwrap();
    let mut host = FakeHost::offline();
    host.adapters.panic_on_list = true;
    let options = test_options(dir.path());

    let result = run_quick_workflow(&host.capabilities(), options).unwrap();

    assert_eq!(status_of(&result, "Network adapter"), Some(HealthStatus::Fail));
    assert!(result
        .faults
        .iter()
        .any(|f| f.stage == "Network adapter" && f.kind == StageFaultKind::Crashed));
    assert!(result.adapter.is_none());
    assert!(result.disabled_wifi_adapters.is_empty());
    // Later stages still ran
    assert!(result.health.find_label("DNS resolution").is_some());
}

#[test]
fn test_toggle_crash_reports_what_was_disabled() {
    let dir = TempDir::new().unwrap();
    let mut host = FakeHost::offline();
    host.adapters = FakeAdapters::new(vec![
        ethernet("eth0", AdapterStatus::Up),
        wifi("wlan0", AdapterStatus::Up),
        wifi("wlan1", AdapterStatus::Up),
    ]);
    host.adapters.panic_on_disable = Some("wlan1".to_string());
    let options = test_options(dir.path());

    let result = run_quick_workflow(&host.capabilities(), options).unwrap();

    assert!(result
        .faults
        .iter()
        .any(|f| f.stage == "Wi-Fi toggle" && f.kind == StageFaultKind::Crashed));
    assert_eq!(status_of(&result, "Wi-Fi toggle"), Some(HealthStatus::Fail));
    assert_eq!(result.disabled_wifi_adapters, vec!["wlan0"]);
    assert_eq!(host.adapters.status("wlan0"), Some(AdapterStatus::Up));
    assert_eq!(host.adapters.status("wlan1"), Some(AdapterStatus::Up));
    assert_eq!(host.adapters.enabled_calls(), vec!["wlan0"]);
    assert!(ToggleRecordStore::new(dir.path()).load_all().is_empty());
}

#[test]
fn test_crashed_ppp_check_starves_connectivity() {
    let dir = TempDir::new().unwrap();
    let mut host = FakeHost::offline();
    host.routes.panic_on_interfaces = true;
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();

    let result = run_quick_workflow(&host.capabilities(), options).unwrap();

    assert_eq!(status_of(&result, "PPP interface"), Some(HealthStatus::Fail));
    assert!(result
        .faults
        .iter()
        .any(|f| f.stage == "PPP interface" && f.kind == StageFaultKind::Crashed));
    assert_eq!(status_of(&result, "Connectivity"), Some(HealthStatus::Fail));
    assert!(result
        .faults
        .iter()
        .any(|f| f.stage == "Connectivity" && f.kind == StageFaultKind::MissingInput));
    assert!(result.ppp_interface.is_none());
    // Connectivity still ran on the empty discovery
    assert!(result.health.find_label("DNS resolution").is_some());
    assert_eq!(host.adapters.status("wlan0"), Some(AdapterStatus::Up));
}

#[test]
fn test_failing_callback_aborts_and_restores() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::offline();
    let seen = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&seen);

    let mut options = test_options(dir.path());
    options.write_log = Some(Box::new(move |line: &str| -> Result<(), String> {
        counter.set(counter.get() + 1);
        if line.starts_with("Checking Network adapter") {
            return Err("transcript disk full".to_string());
        }
        Ok(())
    }));

    let err = run_quick_workflow(&host.capabilities(), options).unwrap_err();
    match err {
        DialdocError::CallerContractViolation(reason) => {
            assert!(reason.contains("transcript disk full"))
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(seen.get() > 1);
    assert_eq!(
        host.adapters.disabled_calls(),
        vec!["wlan0"],
        "Wi-Fi was disabled before the failure"
    );
    assert_eq!(host.adapters.status("wlan0"), Some(AdapterStatus::Up));
    assert!(ToggleRecordStore::new(dir.path()).load_all().is_empty());
}

#[test]
fn test_panicking_callback_is_a_violation() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::offline();
    let mut options = test_options(dir.path());
    options.write_log = Some(Box::new(|_: &str| -> Result<(), String> {
        panic!("callback exploded")
    }));

    let err = run_quick_workflow(&host.capabilities(), options).unwrap_err();
    assert!(matches!(err, DialdocError::CallerContractViolation(_)));
    assert!(host.adapters.calls.lock().unwrap().is_empty());
}

#[test]
fn test_route_metric_tuned_when_ethernet_wins() {
    let dir = TempDir::new().unwrap();
    let mut routes = FakeRoutes::session("DSL", "203.0.113.7");
    routes.routes = vec![
        RouteInfo {
            destination: "default".to_string(),
            gateway: Some("192.168.1.1".parse().unwrap()),
            interface: "eth0".to_string(),
            metric: 100,
        },
        RouteInfo {
            destination: "default".to_string(),
            gateway: None,
            interface: "ppp0".to_string(),
            metric: 200,
        },
    ];
    let host = FakeHost {
        probe: FakeProbe::online(&TARGETS),
        routes,
        ..FakeHost::offline()
    };
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    assert_eq!(
        host.routes.metric_changes.lock().unwrap().clone(),
        vec![("ppp0".to_string(), 5)]
    );
    let route = result.health.find_label("Default route").unwrap();
    assert_eq!(route.status, HealthStatus::Ok);
    assert!(route.detail.contains("lowered from 200 to 5"));
}

#[test]
fn test_quick_never_tunes_routes() {
    let dir = TempDir::new().unwrap();
    let mut routes = FakeRoutes::session("DSL", "203.0.113.7");
    routes.routes.push(RouteInfo {
        destination: "default".to_string(),
        gateway: None,
        interface: "eth0".to_string(),
        metric: 0,
    });
    routes.routes[0].metric = 50;
    let host = FakeHost {
        routes,
        ..FakeHost::offline()
    };
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();

    let result = run_quick_workflow(&host.capabilities(), options).unwrap();
    assert!(host.routes.metric_changes.lock().unwrap().is_empty());
    assert_eq!(status_of(&result, "Default route"), Some(HealthStatus::Warn));
}

#[test]
fn test_stability_runs_when_enabled() {
    let dir = TempDir::new().unwrap();
    let host = connected_host();
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.stability_test = true;

    let result = run_full_workflow(&host.capabilities(), options).unwrap();
    assert_eq!(status_of(&result, "Stability"), Some(HealthStatus::Ok));
}

#[test]
fn test_reports_hide_password() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost {
        probe: FakeProbe::online(&TARGETS),
        ..FakeHost::offline()
    };
    let mut options = test_options(dir.path());
    options.pppoe_name = "DSL".to_string();
    options.user_name = "alice".to_string();
    options.password = "hunter2".to_string();

    let result = run_full_workflow(&host.capabilities(), options).unwrap();

    let text = report::render_text(&result, false);
    assert!(text.contains("dialdoc full diagnostics"));
    assert!(text.contains("Overall:"));
    assert!(text.contains("Wi-Fi toggled:  wlan0 (restored)"));
    assert!(!text.contains("hunter2"));

    let json = report::render_json(&result).unwrap();
    assert!(!json.contains("hunter2"));
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["variant"], "full");
    assert!(value["health"].is_array());
}
