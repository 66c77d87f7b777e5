//! Network model shared by capabilities, stages and reports.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

// =============================================================================
// Adapters
// =============================================================================

/// Administrative/link state of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    /// Enabled with carrier
    Up,
    /// Enabled, no carrier (cable unplugged, not associated)
    Disconnected,
    /// Administratively disabled
    Down,
    Unknown,
}

impl AdapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterStatus::Up => "Up",
            AdapterStatus::Disconnected => "Disconnected",
            AdapterStatus::Down => "Down",
            AdapterStatus::Unknown => "Unknown",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AdapterStatus::Up)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Ethernet,
    Wireless,
    Ppp,
    Loopback,
    Virtual,
    Other,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Ethernet => "ethernet",
            MediaType::Wireless => "wifi",
            MediaType::Ppp => "ppp",
            MediaType::Loopback => "loopback",
            MediaType::Virtual => "virtual",
            MediaType::Other => "other",
        }
    }
}

/// One network adapter as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub name: String,
    pub status: AdapterStatus,
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

impl AdapterInfo {
    pub fn new(name: &str, status: AdapterStatus, media_type: MediaType) -> Self {
        Self {
            name: name.to_string(),
            status,
            media_type,
            mac_address: None,
        }
    }

    pub fn is_wireless(&self) -> bool {
        self.media_type == MediaType::Wireless
    }

    pub fn is_ethernet(&self) -> bool {
        self.media_type == MediaType::Ethernet
    }
}

// =============================================================================
// Interfaces, addresses, routes
// =============================================================================

/// A layer-3 interface (PPP session interface in practice)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Kernel interface name, e.g. `ppp0`
    pub name: String,
    /// Connection (peer) name the interface belongs to, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub media_type: MediaType,
    pub is_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

/// An address assigned to an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub interface: String,
    pub address: IpAddr,
    pub prefix_len: u8,
    /// Point-to-point peer address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<IpAddr>,
}

/// How an assigned IPv4 address should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    Public,
    Private,
    CarrierGradeNat,
    LinkLocal,
    Unspecified,
}

impl AddressInfo {
    pub fn classify(&self) -> AddressClass {
        match self.address {
            IpAddr::V4(v4) => classify_ipv4(v4),
            IpAddr::V6(v6) => {
                if v6.is_unspecified() {
                    AddressClass::Unspecified
                } else if (v6.segments()[0] & 0xffc0) == 0xfe80 {
                    AddressClass::LinkLocal
                } else {
                    AddressClass::Public
                }
            }
        }
    }
}

fn classify_ipv4(addr: Ipv4Addr) -> AddressClass {
    let octets = addr.octets();
    if addr.is_unspecified() {
        AddressClass::Unspecified
    } else if addr.is_link_local() {
        AddressClass::LinkLocal
    } else if octets[0] == 100 && (octets[1] & 0xc0) == 64 {
        // 100.64.0.0/10
        AddressClass::CarrierGradeNat
    } else if addr.is_private() {
        AddressClass::Private
    } else {
        AddressClass::Public
    }
}

/// A routing table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// `default` or a CIDR prefix
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
    pub interface: String,
    pub metric: u32,
}

impl RouteInfo {
    pub fn is_default(&self) -> bool {
        self.destination == "default" || self.destination == "0.0.0.0/0"
    }
}

// =============================================================================
// Probe results
// =============================================================================

/// Result of a ping run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingOutcome {
    pub target: String,
    pub sent: u32,
    pub received: u32,
    pub latencies_ms: Vec<f64>,
}

impl PingOutcome {
    pub fn success(&self) -> bool {
        self.received > 0
    }

    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        let lost = self.sent.saturating_sub(self.received);
        f64::from(lost) * 100.0 / f64::from(self.sent)
    }

    pub fn average_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        Some(self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64)
    }

    /// Mean absolute difference between consecutive samples
    pub fn jitter_ms(&self) -> Option<f64> {
        if self.latencies_ms.len() < 2 {
            return None;
        }
        let diffs: Vec<f64> = self
            .latencies_ms
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .collect();
        Some(diffs.iter().sum::<f64>() / diffs.len() as f64)
    }
}

/// One traceroute hop; `address` is absent when the hop did not answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceHop {
    pub hop: u32,
    pub address: Option<IpAddr>,
    pub rtt_ms: Option<f64>,
}

/// Raw outcome of a dial attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Dialer output, already redacted
    pub output: String,
}

/// Platform and version facts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFacts {
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub hostname: Option<String>,
    /// Effective uid is root
    pub privileged: bool,
}
