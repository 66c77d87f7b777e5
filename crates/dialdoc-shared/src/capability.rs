//! Host capabilities consumed by the diagnostic engine.
//!
//! The engine never touches the OS directly; it goes through these traits.
//! Every operation returns `Result<_, CapabilityError>` so stages can match
//! on outcomes. Implementations must bound every network operation by the
//! timeout they are given.

use std::time::Duration;

use crate::error::CapabilityError;
use crate::net::{
    AdapterInfo, AddressInfo, DialOutcome, HostFacts, InterfaceInfo, PingOutcome, RouteInfo,
    TraceHop,
};

/// Adapter enumeration and enable/disable control
pub trait AdapterProvider {
    fn list_adapters(&self) -> Result<Vec<AdapterInfo>, CapabilityError>;

    /// Enable or disable an adapter. A vanished adapter reports
    /// `CapabilityError::NotFound`.
    fn set_adapter_enabled(&self, name: &str, enabled: bool) -> Result<(), CapabilityError>;
}

/// Reachability primitives. `Sync` so a stage may fan probes out across
/// a thread pool.
pub trait NetProbe: Sync {
    fn ping(&self, target: &str, count: u32, timeout: Duration)
        -> Result<PingOutcome, CapabilityError>;

    /// True when `name` resolves to at least one address
    fn resolve_dns(&self, name: &str, timeout: Duration) -> Result<bool, CapabilityError>;

    fn traceroute(
        &self,
        target: &str,
        max_hops: u32,
        timeout: Duration,
    ) -> Result<Vec<TraceHop>, CapabilityError>;
}

/// Dial-up style WAN connection control
pub trait WanDialer {
    fn dial(
        &self,
        connection_name: &str,
        username: &str,
        password: &str,
    ) -> Result<DialOutcome, CapabilityError>;

    fn disconnect(&self, connection_name: &str) -> Result<(), CapabilityError>;
}

/// Layer-3 view of the host: interfaces, addresses, routes
pub trait RouteTable {
    /// Point-to-point (PPP) interfaces currently present
    fn ppp_interfaces(&self) -> Result<Vec<InterfaceInfo>, CapabilityError>;

    fn addresses(&self, interface: &str) -> Result<Vec<AddressInfo>, CapabilityError>;

    fn default_routes(&self) -> Result<Vec<RouteInfo>, CapabilityError>;

    fn set_route_metric(&self, route: &RouteInfo, metric: u32) -> Result<(), CapabilityError>;
}

pub trait SystemFacts {
    fn collect(&self) -> Result<HostFacts, CapabilityError>;
}

/// Username/password registered with the platform for a connection
#[derive(Clone, PartialEq, Eq)]
pub struct SavedCredential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SavedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Platform-provided saved-credential lookup
pub trait SavedCredentialStore {
    fn lookup(&self, connection_name: &str) -> Result<Option<SavedCredential>, CapabilityError>;
}
