//! In-memory hosts for integration tests.
//!
//! Each fake records what it was asked to do so tests can assert on
//! side effects (adapters toggled, credentials dialed, metrics changed).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use dialdoc::stages::Capabilities;
use dialdoc::WorkflowOptions;
use dialdoc_shared::{
    AdapterInfo, AdapterProvider, AdapterStatus, AddressInfo, CapabilityError, DialOutcome,
    HostFacts, InterfaceInfo, MediaType, NetProbe, PingOutcome, RouteInfo, RouteTable,
    SavedCredential, SavedCredentialStore, SystemFacts, TraceHop, WanDialer,
};

// =============================================================================
// Adapters
// =============================================================================

#[derive(Default)]
pub struct FakeAdapters {
    pub adapters: Mutex<Vec<AdapterInfo>>,
    /// Names whose enable/disable calls fail
    pub refuse: Vec<String>,
    pub panic_on_list: bool,
    /// Disabling this adapter panics
    pub panic_on_disable: Option<String>,
    pub calls: Mutex<Vec<(String, bool)>>,
}

impl FakeAdapters {
    pub fn new(adapters: Vec<AdapterInfo>) -> Self {
        Self {
            adapters: Mutex::new(adapters),
            ..Self::default()
        }
    }

    pub fn status(&self, name: &str) -> Option<AdapterStatus> {
        self.adapters
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.status)
    }

    pub fn disabled_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, enabled)| !enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn enabled_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl AdapterProvider for FakeAdapters {
    fn list_adapters(&self) -> Result<Vec<AdapterInfo>, CapabilityError> {
        if self.panic_on_list {
            panic!("adapter enumeration blew up");
        }
        Ok(self.adapters.lock().unwrap().clone())
    }

    fn set_adapter_enabled(&self, name: &str, enabled: bool) -> Result<(), CapabilityError> {
        if !enabled && self.panic_on_disable.as_deref() == Some(name) {
            panic!("driver crashed disabling {}", name);
        }
        self.calls.lock().unwrap().push((name.to_string(), enabled));
        if self.refuse.iter().any(|r| r == name) {
            return Err(CapabilityError::PermissionDenied(name.to_string()));
        }
        let mut adapters = self.adapters.lock().unwrap();
        let adapter = adapters
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        adapter.status = if enabled {
            AdapterStatus::Up
        } else {
            AdapterStatus::Down
        };
        Ok(())
    }
}

pub fn ethernet(name: &str, status: AdapterStatus) -> AdapterInfo {
    AdapterInfo::new(name, status, MediaType::Ethernet)
}

pub fn wifi(name: &str, status: AdapterStatus) -> AdapterInfo {
    AdapterInfo::new(name, status, MediaType::Wireless)
}

// =============================================================================
// Probe
// =============================================================================

/// Targets listed in `reachable` answer every echo at `latency_ms`
pub struct FakeProbe {
    pub reachable: Vec<String>,
    pub dns_ok: bool,
    pub latency_ms: f64,
    pub hops: Vec<TraceHop>,
}

impl FakeProbe {
    /// Nothing answers
    pub fn offline() -> Self {
        Self {
            reachable: Vec::new(),
            dns_ok: false,
            latency_ms: 0.0,
            hops: Vec::new(),
        }
    }

    /// Everything answers
    pub fn online(targets: &[&str]) -> Self {
        Self {
            reachable: targets.iter().map(|t| t.to_string()).collect(),
            dns_ok: true,
            latency_ms: 12.0,
            hops: vec![
                TraceHop {
                    hop: 1,
                    address: Some("10.0.0.1".parse().unwrap()),
                    rtt_ms: Some(1.0),
                },
                TraceHop {
                    hop: 2,
                    address: Some(targets[0].parse().unwrap()),
                    rtt_ms: Some(12.0),
                },
            ],
        }
    }
}

impl NetProbe for FakeProbe {
    fn ping(
        &self,
        target: &str,
        count: u32,
        _timeout: Duration,
    ) -> Result<PingOutcome, CapabilityError> {
        let answers = self.reachable.iter().any(|t| t == target);
        let received = if answers { count } else { 0 };
        Ok(PingOutcome {
            target: target.to_string(),
            sent: count,
            received,
            latencies_ms: vec![self.latency_ms; received as usize],
        })
    }

    fn resolve_dns(&self, _name: &str, _timeout: Duration) -> Result<bool, CapabilityError> {
        Ok(self.dns_ok)
    }

    fn traceroute(
        &self,
        _target: &str,
        _max_hops: u32,
        _timeout: Duration,
    ) -> Result<Vec<TraceHop>, CapabilityError> {
        Ok(self.hops.clone())
    }
}

// =============================================================================
// Dialer
// =============================================================================

/// Plays back `script` one outcome per dial; success once it runs out
#[derive(Default)]
pub struct FakeDialer {
    pub script: Mutex<Vec<DialOutcome>>,
    /// (connection, username, password) per dial
    pub dials: Mutex<Vec<(String, String, String)>>,
    pub disconnects: Mutex<Vec<String>>,
}

impl FakeDialer {
    pub fn scripted(outcomes: Vec<DialOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes),
            ..Self::default()
        }
    }

    pub fn users_dialed(&self) -> Vec<String> {
        self.dials
            .lock()
            .unwrap()
            .iter()
            .map(|(_, user, _)| user.clone())
            .collect()
    }
}

pub fn auth_failure() -> DialOutcome {
    DialOutcome {
        success: false,
        exit_code: Some(19),
        output: "PAP authentication failed".to_string(),
    }
}

pub fn connected() -> DialOutcome {
    DialOutcome {
        success: true,
        exit_code: Some(0),
        output: "local  IP address 203.0.113.7".to_string(),
    }
}

impl WanDialer for FakeDialer {
    fn dial(
        &self,
        connection_name: &str,
        username: &str,
        password: &str,
    ) -> Result<DialOutcome, CapabilityError> {
        self.dials.lock().unwrap().push((
            connection_name.to_string(),
            username.to_string(),
            password.to_string(),
        ));
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Ok(connected());
        }
        Ok(script.remove(0))
    }

    fn disconnect(&self, connection_name: &str) -> Result<(), CapabilityError> {
        self.disconnects
            .lock()
            .unwrap()
            .push(connection_name.to_string());
        Ok(())
    }
}

// =============================================================================
// Routes
// =============================================================================

#[derive(Default)]
pub struct FakeRoutes {
    pub interfaces: Vec<InterfaceInfo>,
    pub addresses: Vec<AddressInfo>,
    pub routes: Vec<RouteInfo>,
    pub panic_on_interfaces: bool,
    pub metric_changes: Mutex<Vec<(String, u32)>>,
}

impl FakeRoutes {
    /// An established session on ppp0 owning the only default route
    pub fn session(connection: &str, address: &str) -> Self {
        Self {
            interfaces: vec![InterfaceInfo {
                name: "ppp0".to_string(),
                alias: Some(connection.to_string()),
                media_type: MediaType::Ppp,
                is_up: true,
                mtu: Some(1492),
            }],
            addresses: vec![AddressInfo {
                interface: "ppp0".to_string(),
                address: address.parse().unwrap(),
                prefix_len: 32,
                peer: Some("10.64.64.1".parse().unwrap()),
            }],
            routes: vec![RouteInfo {
                destination: "default".to_string(),
                gateway: None,
                interface: "ppp0".to_string(),
                metric: 0,
            }],
            ..Self::default()
        }
    }
}

impl RouteTable for FakeRoutes {
    fn ppp_interfaces(&self) -> Result<Vec<InterfaceInfo>, CapabilityError> {
        if self.panic_on_interfaces {
            panic!("interface table unreadable");
        }
        Ok(self.interfaces.clone())
    }

    fn addresses(&self, interface: &str) -> Result<Vec<AddressInfo>, CapabilityError> {
        Ok(self
            .addresses
            .iter()
            .filter(|a| a.interface == interface)
            .cloned()
            .collect())
    }

    fn default_routes(&self) -> Result<Vec<RouteInfo>, CapabilityError> {
        Ok(self.routes.clone())
    }

    fn set_route_metric(&self, route: &RouteInfo, metric: u32) -> Result<(), CapabilityError> {
        self.metric_changes
            .lock()
            .unwrap()
            .push((route.interface.clone(), metric));
        Ok(())
    }
}

// =============================================================================
// Facts and saved credentials
// =============================================================================

pub struct FakeFacts {
    pub privileged: bool,
}

impl SystemFacts for FakeFacts {
    fn collect(&self) -> Result<HostFacts, CapabilityError> {
        Ok(HostFacts {
            os_name: Some("Debian GNU/Linux".to_string()),
            os_version: Some("12".to_string()),
            kernel_version: Some("6.1.0".to_string()),
            hostname: Some("router-test".to_string()),
            privileged: self.privileged,
        })
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub saved: HashMap<String, SavedCredential>,
}

impl FakeStore {
    pub fn with(connection: &str, username: &str, password: &str) -> Self {
        let mut saved = HashMap::new();
        saved.insert(
            connection.to_string(),
            SavedCredential {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        Self { saved }
    }
}

impl SavedCredentialStore for FakeStore {
    fn lookup(&self, connection_name: &str) -> Result<Option<SavedCredential>, CapabilityError> {
        Ok(self.saved.get(connection_name).cloned())
    }
}

// =============================================================================
// Host
// =============================================================================

pub struct FakeHost {
    pub adapters: FakeAdapters,
    pub probe: FakeProbe,
    pub dialer: FakeDialer,
    pub routes: FakeRoutes,
    pub facts: FakeFacts,
    pub store: FakeStore,
}

impl FakeHost {
    /// One Ethernet adapter with link, one active Wi-Fi adapter, no PPP
    /// session and no connectivity
    pub fn offline() -> Self {
        Self {
            adapters: FakeAdapters::new(vec![
                ethernet("eth0", AdapterStatus::Up),
                wifi("wlan0", AdapterStatus::Up),
            ]),
            probe: FakeProbe::offline(),
            dialer: FakeDialer::default(),
            routes: FakeRoutes::default(),
            facts: FakeFacts { privileged: true },
            store: FakeStore::default(),
        }
    }

    pub fn capabilities(&self) -> Capabilities<'_> {
        Capabilities {
            adapters: &self.adapters,
            probe: &self.probe,
            dialer: &self.dialer,
            routes: &self.routes,
            facts: &self.facts,
            saved_credentials: &self.store,
        }
    }
}

/// Options with fast probes and toggle records under `record_dir`
pub fn test_options(record_dir: &std::path::Path) -> WorkflowOptions {
    let mut options = WorkflowOptions {
        toggle_record_dir: record_dir.to_path_buf(),
        ..WorkflowOptions::default()
    };
    options.probes.ping_count = 2;
    options.probes.loss_samples = 5;
    options.probes.timeout_secs = 1;
    options.stability.samples = 3;
    options.stability.interval_ms = 1;
    options
}
